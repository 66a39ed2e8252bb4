//! Register-level model of the controller: global registers, the command rings, the stream
//! descriptors and the codecs hanging off the link.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hda_audio::regs::*;
use hda_audio::PlatformError;
use tracing::trace;

use crate::codec::SimCodec;
use crate::corb_rirb::{Corb, Rirb};
use crate::mem::PhysMemory;
use crate::stream::SimStream;

const VERSION_MAJOR: u8 = 1;
const VERSION_MINOR: u8 = 0;
const RESPONSE_EX_UNSOL: u32 = 1 << 4;
const ALL_RING_SIZES: u8 = RING_SIZE_CAP_2 | RING_SIZE_CAP_16 | RING_SIZE_CAP_256;

/// Faults a test can switch on.
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Codecs that consume commands but never answer.
    pub silent_codecs: BTreeSet<u8>,
    /// Any access to this register offset fails.
    pub failing_offset: Option<u32>,
    /// GCTL.CRST never reads back as set.
    pub stuck_in_reset: bool,
    /// DMA allocations fail once this many have succeeded.
    pub dma_alloc_limit: Option<usize>,
}

/// One command the link carried: (codec, node, verb).
pub type LoggedVerb = (u8, u8, u32);

#[derive(Debug)]
pub struct SimHda {
    gcap: u16,
    ring_size_caps: u8,
    gctl: u32,
    statests: u16,
    corb: Corb,
    rirb: Rirb,
    streams: Vec<SimStream>,
    codecs: BTreeMap<u8, SimCodec>,
    pub(crate) mem: PhysMemory,
    pub faults: Faults,
    /// Responses pushed ahead of the next solicited one.
    noise: VecDeque<(u32, u32)>,
    verb_log: Vec<LoggedVerb>,
    clock_us: u64,
}

impl SimHda {
    /// A controller with `out`/`input`/`bidir` stream descriptors and 64-bit addressing.
    pub fn new(out: u8, input: u8, bidir: u8) -> Self {
        let gcap = gcap_with_streams(out, input, bidir, true);
        let mut hda = Self {
            gcap,
            ring_size_caps: ALL_RING_SIZES,
            gctl: 0,
            statests: 0,
            corb: Corb::full(),
            rirb: Rirb::full(),
            streams: Vec::new(),
            codecs: BTreeMap::new(),
            mem: PhysMemory::new(0x1000_0000, 4 << 20),
            faults: Faults::default(),
            noise: VecDeque::new(),
            verb_log: Vec::new(),
            clock_us: 0,
        };
        hda.power_on_reset();
        hda
    }

    pub fn codec(mut self, address: u8, codec: SimCodec) -> Self {
        self.codecs.insert(address & 0xF, codec);
        self
    }

    /// Restrict the CORBSIZE/RIRBSIZE capability bits.
    pub fn ring_sizes(mut self, caps: u8) -> Self {
        self.ring_size_caps = caps;
        self.power_on_reset();
        self
    }

    fn power_on_reset(&mut self) {
        self.corb = Corb::new(self.ring_size_caps);
        self.rirb = Rirb::new(self.ring_size_caps);
        let caps = ControllerCaps::from_gcap(self.gcap);
        let inputs = usize::from(caps.input_streams);
        self.streams = (0..caps.total_streams())
            .map(|index| SimStream::new(index >= inputs))
            .collect();
        self.statests = 0;
    }

    pub fn codec_model(&self, address: u8) -> Option<&SimCodec> {
        self.codecs.get(&address)
    }

    pub fn stream(&self, index: usize) -> Option<&SimStream> {
        self.streams.get(index)
    }

    pub fn stream_mut(&mut self, index: usize) -> Option<&mut SimStream> {
        self.streams.get_mut(index)
    }

    pub fn verb_log(&self) -> &[LoggedVerb] {
        &self.verb_log
    }

    pub fn clear_verb_log(&mut self) {
        self.verb_log.clear();
    }

    pub fn memory(&self) -> &PhysMemory {
        &self.mem
    }

    pub fn clock_us(&self) -> u64 {
        self.clock_us
    }

    pub fn corb_running(&self) -> bool {
        self.corb.is_running()
    }

    pub fn rirb_running(&self) -> bool {
        self.rirb.is_running()
    }

    /// Queue an unsolicited response from `codec` ahead of the next solicited one.
    pub fn inject_unsolicited(&mut self, codec: u8, response: u32) {
        self.noise
            .push_back((response, u32::from(codec & 0xF) | RESPONSE_EX_UNSOL));
    }

    /// Queue a solicited-looking response tagged with another codec's address.
    pub fn inject_foreign(&mut self, codec: u8, response: u32) {
        self.noise.push_back((response, u32::from(codec & 0xF)));
    }

    fn check(&self, offset: u32, size: usize) -> Result<(), PlatformError> {
        if self.faults.failing_offset == Some(offset) {
            return Err(PlatformError::Io { offset, size });
        }
        Ok(())
    }

    pub fn mmio_read(&self, offset: u32, size: usize) -> Result<u32, PlatformError> {
        self.check(offset, size)?;
        let value = match offset {
            HDA_GCAP => {
                u32::from(self.gcap)
                    | (u32::from(VERSION_MINOR) << 16)
                    | (u32::from(VERSION_MAJOR) << 24)
            }
            HDA_VMIN => u32::from(VERSION_MINOR),
            HDA_VMAJ => u32::from(VERSION_MAJOR),
            HDA_GCTL => self.gctl,
            HDA_STATESTS => u32::from(self.statests),
            0x40..=0x4F => self.corb.read(offset),
            0x50..=0x5F => self.rirb.read(offset),
            _ if offset >= HDA_SD_BASE => {
                let index = ((offset - HDA_SD_BASE) / HDA_SD_STRIDE) as usize;
                let rel = (offset - HDA_SD_BASE) % HDA_SD_STRIDE;
                return Ok(self
                    .streams
                    .get(index)
                    .map_or(0, |stream| stream.read(rel, size)));
            }
            _ => 0,
        };
        Ok(match size {
            1 => value & 0xFF,
            2 => value & 0xFFFF,
            _ => value,
        })
    }

    pub fn mmio_write(
        &mut self,
        offset: u32,
        size: usize,
        value: u32,
    ) -> Result<(), PlatformError> {
        self.check(offset, size)?;
        match offset {
            HDA_GCTL => self.write_gctl(value),
            HDA_STATESTS => self.statests &= !(value as u16),
            0x40..=0x4F => self.corb.write(offset, value),
            0x50..=0x5F => self.rirb.write(offset, value),
            _ if offset >= HDA_SD_BASE => {
                let index = ((offset - HDA_SD_BASE) / HDA_SD_STRIDE) as usize;
                let rel = (offset - HDA_SD_BASE) % HDA_SD_STRIDE;
                if let Some(stream) = self.streams.get_mut(index) {
                    stream.write(rel, size, value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn write_gctl(&mut self, value: u32) {
        let was_running = self.gctl & GCTL_CRST != 0;
        let running = value & GCTL_CRST != 0 && !self.faults.stuck_in_reset;
        self.gctl = if running {
            value
        } else {
            value & !GCTL_CRST
        };
        if was_running && !running {
            self.power_on_reset();
        }
        if !was_running && running {
            self.statests = self
                .codecs
                .keys()
                .fold(0, |mask, address| mask | (1 << address));
        }
    }

    /// Let `micros` of simulated time pass: the CORB drains and running streams move.
    pub fn step(&mut self, micros: u32) {
        self.clock_us += u64::from(micros);
        self.process_commands();
        for stream in &mut self.streams {
            stream.advance(&mut self.mem, micros);
        }
    }

    fn process_commands(&mut self) {
        while let Some(cmd) = self.corb.pop_command(&self.mem) {
            let codec = (cmd >> 28) as u8;
            let nid = ((cmd >> 20) & 0x7F) as u8;
            let verb = cmd & 0xF_FFFF;
            self.verb_log.push((codec, nid, verb));

            if self.faults.silent_codecs.contains(&codec) {
                continue;
            }
            let Some(response) = self
                .codecs
                .get_mut(&codec)
                .and_then(|model| model.execute_verb(nid, verb))
            else {
                trace!(codec, nid, verb, "command left unanswered");
                continue;
            };
            while let Some((noise, ext)) = self.noise.pop_front() {
                self.rirb.push_response(&mut self.mem, noise, ext);
            }
            self.rirb
                .push_response(&mut self.mem, response, u32::from(codec));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaving_reset_reports_present_codecs() {
        let mut hda = SimHda::new(1, 1, 0)
            .codec(0, SimCodec::new(0x10EC_0662, 0))
            .codec(2, SimCodec::new(0x8086_2805, 0));
        hda.mmio_write(HDA_GCTL, 4, 0).unwrap();
        assert_eq!(hda.mmio_read(HDA_STATESTS, 2).unwrap(), 0);
        hda.mmio_write(HDA_GCTL, 4, GCTL_CRST).unwrap();
        assert_eq!(hda.mmio_read(HDA_STATESTS, 2).unwrap(), 0b101);

        hda.mmio_write(HDA_STATESTS, 2, 0b001).unwrap();
        assert_eq!(hda.mmio_read(HDA_STATESTS, 2).unwrap(), 0b100);
    }

    #[test]
    fn stuck_reset_never_reads_back() {
        let mut hda = SimHda::new(1, 0, 0);
        hda.faults.stuck_in_reset = true;
        hda.mmio_write(HDA_GCTL, 4, GCTL_CRST).unwrap();
        assert_eq!(hda.mmio_read(HDA_GCTL, 4).unwrap() & GCTL_CRST, 0);
    }

    #[test]
    fn failing_offset_reports_an_io_error() {
        let mut hda = SimHda::new(1, 0, 0);
        hda.faults.failing_offset = Some(HDA_CORBWP);
        assert_eq!(
            hda.mmio_write(HDA_CORBWP, 2, 1),
            Err(PlatformError::Io {
                offset: HDA_CORBWP,
                size: 2
            })
        );
        assert!(hda.mmio_read(HDA_GCAP, 2).is_ok());
    }

    #[test]
    fn stream_registers_route_by_descriptor() {
        let mut hda = SimHda::new(1, 1, 0);
        // Descriptor 1 is the output stream.
        hda.mmio_write(stream_base(1) + SD_CBL, 4, 4096).unwrap();
        assert_eq!(hda.mmio_read(stream_base(1) + SD_CBL, 4).unwrap(), 4096);
        assert_eq!(hda.mmio_read(stream_base(0) + SD_CBL, 4).unwrap(), 0);
        assert_eq!(hda.mmio_read(HDA_GCAP, 2).unwrap(), 0x1101);
    }
}
