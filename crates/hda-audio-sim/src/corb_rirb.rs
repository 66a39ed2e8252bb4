use hda_audio::regs::*;

use crate::mem::PhysMemory;

const SIZE_CAPS_ALL: u8 = RING_SIZE_CAP_2 | RING_SIZE_CAP_16 | RING_SIZE_CAP_256;

fn ring_entries(size: u8) -> u16 {
    match size & 0x3 {
        0 => 2,
        1 => 16,
        _ => 256,
    }
}

fn ring_base(lbase: u32, ubase: u32) -> u64 {
    // Bits 6:0 are reserved; bases are 128-byte aligned.
    (u64::from(ubase) << 32) | (u64::from(lbase) & !0x7F)
}

/// Command Outbound Ring Buffer registers.
#[derive(Debug)]
pub struct Corb {
    lbase: u32,
    ubase: u32,
    wp: u16,
    rp: u16,
    /// CORBRP.RST as last written; reads back once the pointer has cleared.
    rp_reset: bool,
    ctl: u8,
    sts: u8,
    size: u8,
}

impl Corb {
    pub fn new(size_caps: u8) -> Self {
        Self {
            lbase: 0,
            ubase: 0,
            wp: 0,
            rp: 0,
            rp_reset: false,
            ctl: 0,
            sts: 0,
            size: size_caps & SIZE_CAPS_ALL,
        }
    }

    pub fn full() -> Self {
        Self::new(SIZE_CAPS_ALL)
    }

    pub fn is_running(&self) -> bool {
        self.ctl & CORBCTL_RUN != 0
    }

    pub fn entries(&self) -> u16 {
        ring_entries(self.size)
    }

    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            HDA_CORBLBASE => self.lbase,
            HDA_CORBUBASE => self.ubase,
            HDA_CORBWP => u32::from(self.wp),
            HDA_CORBRP => {
                let rst = if self.rp_reset { CORBRP_RST } else { 0 };
                u32::from(self.rp | rst)
            }
            HDA_CORBCTL => u32::from(self.ctl),
            HDA_CORBSTS => u32::from(self.sts),
            HDA_CORBSIZE => u32::from(self.size),
            _ => 0,
        }
    }

    pub fn write(&mut self, offset: u32, value: u32) {
        let mask = self.entries() - 1;
        match offset {
            HDA_CORBLBASE => self.lbase = value,
            HDA_CORBUBASE => self.ubase = value,
            HDA_CORBWP => self.wp = value as u16 & mask,
            HDA_CORBRP => {
                if value as u16 & CORBRP_RST != 0 {
                    self.rp = 0;
                    self.rp_reset = true;
                } else {
                    self.rp_reset = false;
                }
            }
            HDA_CORBCTL => self.ctl = value as u8,
            HDA_CORBSTS => self.sts &= !(value as u8),
            HDA_CORBSIZE => {
                let old = self.size & 0x3;
                self.size = (self.size & !0x3) | (value as u8 & 0x3);
                if self.size & 0x3 != old {
                    let mask = self.entries() - 1;
                    self.wp &= mask;
                    self.rp &= mask;
                }
            }
            _ => {}
        }
    }

    /// Fetch the next queued command word, advancing CORBRP.
    pub fn pop_command(&mut self, mem: &PhysMemory) -> Option<u32> {
        if !self.is_running() || self.rp == self.wp {
            return None;
        }
        let next = (self.rp + 1) % self.entries();
        self.rp = next;
        Some(mem.read_u32(ring_base(self.lbase, self.ubase) + u64::from(next) * 4))
    }
}

/// Response Inbound Ring Buffer registers.
#[derive(Debug)]
pub struct Rirb {
    lbase: u32,
    ubase: u32,
    wp: u16,
    rintcnt: u16,
    ctl: u8,
    sts: u8,
    size: u8,
    pushed: u64,
}

impl Rirb {
    pub fn new(size_caps: u8) -> Self {
        Self {
            lbase: 0,
            ubase: 0,
            wp: 0,
            rintcnt: 0,
            ctl: 0,
            sts: 0,
            size: size_caps & SIZE_CAPS_ALL,
            pushed: 0,
        }
    }

    pub fn full() -> Self {
        Self::new(SIZE_CAPS_ALL)
    }

    pub fn is_running(&self) -> bool {
        self.ctl & RIRBCTL_RUN != 0
    }

    pub fn entries(&self) -> u16 {
        ring_entries(self.size)
    }

    /// Responses written since power-on.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            HDA_RIRBLBASE => self.lbase,
            HDA_RIRBUBASE => self.ubase,
            HDA_RIRBWP => u32::from(self.wp),
            HDA_RINTCNT => u32::from(self.rintcnt),
            HDA_RIRBCTL => u32::from(self.ctl),
            HDA_RIRBSTS => u32::from(self.sts),
            HDA_RIRBSIZE => u32::from(self.size),
            _ => 0,
        }
    }

    pub fn write(&mut self, offset: u32, value: u32) {
        match offset {
            HDA_RIRBLBASE => self.lbase = value,
            HDA_RIRBUBASE => self.ubase = value,
            HDA_RIRBWP => {
                if value as u16 & RIRBWP_RST != 0 {
                    self.wp = 0;
                }
            }
            HDA_RINTCNT => self.rintcnt = value as u16,
            HDA_RIRBCTL => self.ctl = value as u8,
            HDA_RIRBSTS => self.sts &= !(value as u8),
            HDA_RIRBSIZE => self.size = (self.size & !0x3) | (value as u8 & 0x3),
            _ => {}
        }
    }

    /// Write one response entry (response low dword, extended word high dword).
    pub fn push_response(&mut self, mem: &mut PhysMemory, response: u32, ext: u32) {
        if !self.is_running() {
            return;
        }
        let next = (self.wp + 1) % self.entries();
        let addr = ring_base(self.lbase, self.ubase) + u64::from(next) * 8;
        mem.write_u64(addr, (u64::from(ext) << 32) | u64::from(response));
        self.wp = next;
        self.pushed += 1;
        self.sts |= RIRBSTS_RINTFL;
    }
}
