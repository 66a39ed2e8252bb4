//! MMIO register layout and bit definitions for an Intel HDA controller.

pub const HDA_GCAP: u32 = 0x00;
pub const HDA_VMIN: u32 = 0x02;
pub const HDA_VMAJ: u32 = 0x03;
pub const HDA_GCTL: u32 = 0x08;
pub const HDA_WAKEEN: u32 = 0x0C;
pub const HDA_STATESTS: u32 = 0x0E;
pub const HDA_INTCTL: u32 = 0x20;

pub const HDA_CORBLBASE: u32 = 0x40;
pub const HDA_CORBUBASE: u32 = 0x44;
pub const HDA_CORBWP: u32 = 0x48;
pub const HDA_CORBRP: u32 = 0x4A;
pub const HDA_CORBCTL: u32 = 0x4C;
pub const HDA_CORBSTS: u32 = 0x4D;
pub const HDA_CORBSIZE: u32 = 0x4E;

pub const HDA_RIRBLBASE: u32 = 0x50;
pub const HDA_RIRBUBASE: u32 = 0x54;
pub const HDA_RIRBWP: u32 = 0x58;
pub const HDA_RINTCNT: u32 = 0x5A;
pub const HDA_RIRBCTL: u32 = 0x5C;
pub const HDA_RIRBSTS: u32 = 0x5D;
pub const HDA_RIRBSIZE: u32 = 0x5E;

/// First stream descriptor; descriptors are 0x20 apart, inputs first, then outputs, then
/// bidirectional streams.
pub const HDA_SD_BASE: u32 = 0x80;
pub const HDA_SD_STRIDE: u32 = 0x20;

// Offsets within one stream descriptor.
pub const SD_CTL: u32 = 0x00;
pub const SD_STS: u32 = 0x03;
pub const SD_LPIB: u32 = 0x04;
pub const SD_CBL: u32 = 0x08;
pub const SD_LVI: u32 = 0x0C;
pub const SD_FMT: u32 = 0x12;
pub const SD_BDPL: u32 = 0x18;
pub const SD_BDPU: u32 = 0x1C;

pub const GCTL_CRST: u32 = 1 << 0;

pub const CORBRP_RST: u16 = 1 << 15;
pub const CORBCTL_RUN: u8 = 1 << 1;
pub const CORBSTS_CMEI: u8 = 1 << 0;

pub const RIRBWP_RST: u16 = 1 << 15;
pub const RIRBCTL_RUN: u8 = 1 << 1;
pub const RIRBSTS_RINTFL: u8 = 1 << 0;
pub const RIRBSTS_RIRBOIS: u8 = 1 << 2;

// CORBSIZE/RIRBSIZE capability bits (RO).
pub const RING_SIZE_CAP_2: u8 = 1 << 4;
pub const RING_SIZE_CAP_16: u8 = 1 << 5;
pub const RING_SIZE_CAP_256: u8 = 1 << 6;

pub const SD_CTL_SRST: u32 = 1 << 0;
pub const SD_CTL_RUN: u32 = 1 << 1;
pub const SD_CTL_IOCE: u32 = 1 << 2;
pub const SD_CTL_DIR: u32 = 1 << 19;
pub const SD_CTL_STRM_SHIFT: u32 = 20;
pub const SD_CTL_STRM_MASK: u32 = 0xF << SD_CTL_STRM_SHIFT;

pub const SD_STS_BCIS: u8 = 1 << 2;
pub const SD_STS_FIFOE: u8 = 1 << 3;
pub const SD_STS_DESE: u8 = 1 << 4;

/// Codec addresses the link can carry (STATESTS bits 14:0).
pub const MAX_CODECS: u8 = 15;
pub const STATESTS_MASK: u16 = 0x7FFF;

/// Size in bytes of one buffer descriptor list entry.
pub const BDL_ENTRY_SIZE: usize = 16;
/// BDL, CORB and RIRB base addresses must be 128-byte aligned.
pub const DMA_BASE_ALIGN: usize = 128;

pub fn stream_base(index: usize) -> u32 {
    HDA_SD_BASE + HDA_SD_STRIDE * index as u32
}

/// Ring sizes selectable in CORBSIZE/RIRBSIZE.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub enum RingSize {
    Entries2,
    Entries16,
    Entries256,
}

impl RingSize {
    pub fn entries(self) -> u16 {
        match self {
            RingSize::Entries2 => 2,
            RingSize::Entries16 => 16,
            RingSize::Entries256 => 256,
        }
    }

    /// Value for the size selection field (bits 1:0).
    pub fn select_bits(self) -> u8 {
        match self {
            RingSize::Entries2 => 0,
            RingSize::Entries16 => 1,
            RingSize::Entries256 => 2,
        }
    }

    fn cap_bit(self) -> u8 {
        match self {
            RingSize::Entries2 => RING_SIZE_CAP_2,
            RingSize::Entries16 => RING_SIZE_CAP_16,
            RingSize::Entries256 => RING_SIZE_CAP_256,
        }
    }

    /// Largest size advertised in a CORBSIZE/RIRBSIZE register that does not exceed `limit`.
    pub fn largest_supported(size_reg: u8, limit: RingSize) -> Option<RingSize> {
        [RingSize::Entries256, RingSize::Entries16, RingSize::Entries2]
            .into_iter()
            .filter(|size| *size <= limit)
            .find(|size| size_reg & size.cap_bit() != 0)
    }
}

/// Decoded GCAP register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ControllerCaps {
    pub output_streams: u8,
    pub input_streams: u8,
    pub bidir_streams: u8,
    pub serial_data_out: u8,
    pub addr64: bool,
}

impl ControllerCaps {
    pub fn from_gcap(gcap: u16) -> Self {
        Self {
            output_streams: ((gcap >> 12) & 0xF) as u8,
            input_streams: ((gcap >> 8) & 0xF) as u8,
            bidir_streams: ((gcap >> 3) & 0x1F) as u8,
            serial_data_out: match (gcap >> 1) & 0x3 {
                0 => 1,
                1 => 2,
                _ => 4,
            },
            addr64: gcap & 1 != 0,
        }
    }

    pub fn total_streams(&self) -> usize {
        usize::from(self.input_streams)
            + usize::from(self.output_streams)
            + usize::from(self.bidir_streams)
    }
}

pub fn gcap_with_streams(out: u8, input: u8, bidir: u8, addr64: bool) -> u16 {
    (((out as u16) & 0xF) << 12)
        | (((input as u16) & 0xF) << 8)
        | (((bidir as u16) & 0x1F) << 3)
        | u16::from(addr64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcap_decodes_stream_partitions() {
        let caps = ControllerCaps::from_gcap(gcap_with_streams(4, 4, 0, true));
        assert_eq!(caps.output_streams, 4);
        assert_eq!(caps.input_streams, 4);
        assert_eq!(caps.bidir_streams, 0);
        assert!(caps.addr64);
        assert_eq!(caps.total_streams(), 8);

        // ICH6-style GCAP: 4 out, 4 in, 0 bidir, 1 SDO, 64-bit.
        let caps = ControllerCaps::from_gcap(0x4401);
        assert_eq!((caps.output_streams, caps.input_streams), (4, 4));
        assert_eq!(caps.serial_data_out, 1);
    }

    #[test]
    fn ring_size_picks_largest_advertised_within_limit() {
        let all = RING_SIZE_CAP_2 | RING_SIZE_CAP_16 | RING_SIZE_CAP_256;
        assert_eq!(
            RingSize::largest_supported(all, RingSize::Entries256),
            Some(RingSize::Entries256)
        );
        assert_eq!(
            RingSize::largest_supported(all, RingSize::Entries16),
            Some(RingSize::Entries16)
        );
        assert_eq!(
            RingSize::largest_supported(RING_SIZE_CAP_2, RingSize::Entries256),
            Some(RingSize::Entries2)
        );
        assert_eq!(RingSize::largest_supported(0, RingSize::Entries256), None);
    }

    #[test]
    fn stream_descriptors_are_0x20_apart() {
        assert_eq!(stream_base(0), 0x80);
        assert_eq!(stream_base(4), 0x100);
    }
}
