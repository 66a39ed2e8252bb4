use hda_audio::regs::*;
use hda_audio::StreamFormat;

use crate::mem::PhysMemory;

#[derive(Debug, Copy, Clone)]
struct BdlEntry {
    addr: u64,
    len: u32,
    ioc: bool,
}

/// One stream descriptor's registers plus its DMA engine.
///
/// SRST holds the descriptor in reset; DMA runs while RUN is set and SRST is clear. Progress is
/// paced by simulated time: [`SimStream::advance`] moves `rate * frame_bytes` bytes per second
/// of elapsed time through the BDL.
#[derive(Debug)]
pub struct SimStream {
    output: bool,
    ctl: u32,
    sts: u8,
    lpib: u32,
    cbl: u32,
    lvi: u16,
    fmt: u16,
    bdpl: u32,
    bdpu: u32,

    bdl_index: u16,
    bdl_offset: u32,
    /// Byte-microseconds owed to the link, carried between advances.
    credit: u64,
    frozen: bool,

    played: Vec<u8>,
    capture_source: Vec<u8>,
    capture_cursor: usize,
    completions: u32,
}

impl SimStream {
    pub fn new(output: bool) -> Self {
        Self {
            output,
            ctl: 0,
            sts: 0,
            lpib: 0,
            cbl: 0,
            lvi: 0,
            fmt: 0,
            bdpl: 0,
            bdpu: 0,
            bdl_index: 0,
            bdl_offset: 0,
            credit: 0,
            frozen: false,
            played: Vec::new(),
            capture_source: Vec::new(),
            capture_cursor: 0,
            completions: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ctl & SD_CTL_RUN != 0 && self.ctl & SD_CTL_SRST == 0
    }

    pub fn tag(&self) -> u8 {
        ((self.ctl & SD_CTL_STRM_MASK) >> SD_CTL_STRM_SHIFT) as u8
    }

    pub fn fmt(&self) -> u16 {
        self.fmt
    }

    pub fn lpib(&self) -> u32 {
        self.lpib
    }

    /// Bytes the engine has fetched from memory and sent down the link.
    pub fn played(&self) -> &[u8] {
        &self.played
    }

    /// Buffer-completion interrupts raised so far.
    pub fn completions(&self) -> u32 {
        self.completions
    }

    /// Keep the engine from moving even while RUN is set.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Bytes an input stream delivers; silence once exhausted.
    pub fn set_capture_source(&mut self, data: Vec<u8>) {
        self.capture_source = data;
        self.capture_cursor = 0;
    }

    fn bdl_base(&self) -> u64 {
        (u64::from(self.bdpu) << 32) | (u64::from(self.bdpl) & !0x7F)
    }

    pub fn read(&self, rel: u32, size: usize) -> u32 {
        let value = match rel & !0x3 {
            SD_CTL => (u32::from(self.sts) << 24) | self.ctl,
            SD_LPIB => self.lpib,
            SD_CBL => self.cbl,
            SD_LVI => u32::from(self.lvi),
            0x10 => u32::from(self.fmt) << 16,
            SD_BDPL => self.bdpl,
            SD_BDPU => self.bdpu,
            _ => 0,
        };
        let shifted = value >> (8 * (rel & 0x3));
        match size {
            1 => shifted & 0xFF,
            2 => shifted & 0xFFFF,
            _ => shifted,
        }
    }

    pub fn write(&mut self, rel: u32, size: usize, value: u32) {
        match (rel, size) {
            (SD_CTL, 4) => {
                self.sts &= !((value >> 24) as u8);
                self.write_ctl(value & 0x00FF_FFFF);
            }
            (SD_CTL, _) => {
                let mask = if size == 1 { 0xFF } else { 0xFFFF };
                self.write_ctl((self.ctl & !mask) | (value & mask));
            }
            (SD_STS, _) => self.sts &= !(value as u8),
            (SD_CBL, _) => self.cbl = value,
            (SD_LVI, _) => self.lvi = value as u16 & 0xFF,
            (SD_FMT, _) => self.fmt = value as u16,
            (SD_BDPL, _) => self.bdpl = value,
            (SD_BDPU, _) => self.bdpu = value,
            // LPIB and everything else is read-only.
            _ => {}
        }
    }

    fn write_ctl(&mut self, ctl: u32) {
        let entering_reset = self.ctl & SD_CTL_SRST == 0 && ctl & SD_CTL_SRST != 0;
        let leaving_reset = self.ctl & SD_CTL_SRST != 0 && ctl & SD_CTL_SRST == 0;
        let starting = self.ctl & SD_CTL_RUN == 0 && ctl & SD_CTL_RUN != 0;
        self.ctl = ctl;
        if entering_reset || leaving_reset {
            self.lpib = 0;
            self.sts = 0;
            self.bdl_index = 0;
            self.bdl_offset = 0;
            self.credit = 0;
        }
        if starting {
            self.played.clear();
        }
    }

    fn read_bdl_entry(&self, mem: &PhysMemory, index: u16) -> BdlEntry {
        let addr = self.bdl_base() + u64::from(index) * 16;
        let flags = mem.read_u32(addr + 12);
        BdlEntry {
            addr: mem.read_u64(addr),
            len: mem.read_u32(addr + 8),
            ioc: flags & 1 != 0,
        }
    }

    /// Move `micros` worth of audio through the BDL.
    pub fn advance(&mut self, mem: &mut PhysMemory, micros: u32) {
        if !self.is_running() || self.frozen || self.cbl == 0 {
            return;
        }
        let Some(format) = StreamFormat::from_hda_fmt(self.fmt) else {
            return;
        };
        let bytes_per_sec = u64::from(format.sample_rate) * u64::from(format.bytes_per_frame());
        self.credit += bytes_per_sec * u64::from(micros);
        let mut budget = self.credit / 1_000_000;
        self.credit %= 1_000_000;

        // Bound the walk so an all-empty BDL cannot spin.
        let mut empty_entries = 0usize;
        while budget > 0 {
            let entry = self.read_bdl_entry(mem, self.bdl_index);
            let remaining = entry.len.saturating_sub(self.bdl_offset);
            if remaining == 0 {
                empty_entries += 1;
                if empty_entries > usize::from(self.lvi) + 1 {
                    return;
                }
                self.finish_entry(entry);
                continue;
            }
            empty_entries = 0;

            let take = u64::from(remaining).min(budget) as u32;
            let addr = entry.addr + u64::from(self.bdl_offset);
            let mut chunk = vec![0u8; take as usize];
            if self.output {
                mem.read_physical(addr, &mut chunk);
                self.played.extend_from_slice(&chunk);
            } else {
                let available = self.capture_source.len() - self.capture_cursor;
                let n = available.min(chunk.len());
                chunk[..n].copy_from_slice(
                    &self.capture_source[self.capture_cursor..self.capture_cursor + n],
                );
                self.capture_cursor += n;
                mem.write_physical(addr, &chunk);
            }

            self.bdl_offset += take;
            self.lpib = (self.lpib + take) % self.cbl;
            budget -= u64::from(take);
            self.finish_entry(entry);
        }
    }

    fn finish_entry(&mut self, entry: BdlEntry) {
        if self.bdl_offset < entry.len {
            return;
        }
        self.bdl_offset = 0;
        if entry.ioc {
            self.sts |= SD_STS_BCIS;
            self.completions += 1;
        }
        self.bdl_index = if self.bdl_index >= self.lvi {
            0
        } else {
            self.bdl_index + 1
        };
    }
}
