//! Converter/stream format words and the codec's PCM capability bitmask.

use crate::error::{HdaError, Result};

const FMT_BASE_44K1: u16 = 1 << 14;

/// One row of the sample rate table: which base clock, multiplier and divisor produce the rate,
/// and which bit of the PCM size/rate parameter advertises it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct RateEntry {
    hz: u32,
    base_44k1: bool,
    mult: u8,
    div: u8,
    pcm_bit: u8,
}

const RATE_TABLE: [RateEntry; 11] = [
    RateEntry { hz: 8_000, base_44k1: false, mult: 1, div: 6, pcm_bit: 0 },
    RateEntry { hz: 11_025, base_44k1: true, mult: 1, div: 4, pcm_bit: 1 },
    RateEntry { hz: 16_000, base_44k1: false, mult: 1, div: 3, pcm_bit: 2 },
    RateEntry { hz: 22_050, base_44k1: true, mult: 1, div: 2, pcm_bit: 3 },
    RateEntry { hz: 32_000, base_44k1: false, mult: 2, div: 3, pcm_bit: 4 },
    RateEntry { hz: 44_100, base_44k1: true, mult: 1, div: 1, pcm_bit: 5 },
    RateEntry { hz: 48_000, base_44k1: false, mult: 1, div: 1, pcm_bit: 6 },
    RateEntry { hz: 88_200, base_44k1: true, mult: 2, div: 1, pcm_bit: 7 },
    RateEntry { hz: 96_000, base_44k1: false, mult: 2, div: 1, pcm_bit: 8 },
    RateEntry { hz: 176_400, base_44k1: true, mult: 4, div: 1, pcm_bit: 9 },
    RateEntry { hz: 192_000, base_44k1: false, mult: 4, div: 1, pcm_bit: 10 },
];

/// Sample containers: (bits, format code, PCM size bit).
const BITS_TABLE: [(u8, u16, u8); 5] = [
    (8, 0, 16),
    (16, 1, 17),
    (20, 2, 18),
    (24, 3, 19),
    (32, 4, 20),
];

pub const SUPPORTED_RATES: [u32; 11] = [
    8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 88_200, 96_000, 176_400, 192_000,
];
pub const SUPPORTED_BITS: [u8; 5] = [8, 16, 20, 24, 32];

fn rate_entry(hz: u32) -> Option<&'static RateEntry> {
    RATE_TABLE.iter().find(|entry| entry.hz == hz)
}

fn bits_entry(bits: u8) -> Option<&'static (u8, u16, u8)> {
    BITS_TABLE.iter().find(|(b, _, _)| *b == bits)
}

/// PCM stream format as negotiated with a converter.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channels: u8,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, bits_per_sample: u8, channels: u8) -> Result<Self> {
        if rate_entry(sample_rate).is_none() {
            return Err(HdaError::Unsupported("sample rate has no converter encoding"));
        }
        if bits_entry(bits_per_sample).is_none() {
            return Err(HdaError::Unsupported("bit depth has no converter encoding"));
        }
        if channels == 0 || channels > 16 {
            return Err(HdaError::InvalidParameter("channel count must be 1..=16"));
        }
        Ok(Self {
            sample_rate,
            bits_per_sample,
            channels,
        })
    }

    /// Encode as the 16-bit converter format word shared by SET_CONVERTER_FORMAT and SDnFMT.
    pub fn to_hda_fmt(&self) -> Result<u16> {
        let rate = rate_entry(self.sample_rate)
            .ok_or(HdaError::Unsupported("sample rate has no converter encoding"))?;
        let &(_, bits_code, _) = bits_entry(self.bits_per_sample)
            .ok_or(HdaError::Unsupported("bit depth has no converter encoding"))?;
        if self.channels == 0 || self.channels > 16 {
            return Err(HdaError::InvalidParameter("channel count must be 1..=16"));
        }

        let mut fmt = u16::from(self.channels - 1);
        fmt |= bits_code << 4;
        fmt |= u16::from(rate.div - 1) << 8;
        fmt |= u16::from(rate.mult - 1) << 11;
        if rate.base_44k1 {
            fmt |= FMT_BASE_44K1;
        }
        Ok(fmt)
    }

    /// Decode a converter format word. Non-PCM words and reserved bit codes yield `None`.
    pub fn from_hda_fmt(fmt: u16) -> Option<Self> {
        if fmt & (1 << 15) != 0 {
            return None;
        }
        let base = if fmt & FMT_BASE_44K1 != 0 { 44_100 } else { 48_000 };
        let mult = u32::from((fmt >> 11) & 0x7) + 1;
        let div = u32::from((fmt >> 8) & 0x7) + 1;

        let code = (fmt >> 4) & 0x7;
        let &(bits, _, _) = BITS_TABLE.iter().find(|(_, c, _)| *c == code)?;

        Some(Self {
            sample_rate: base * mult / div,
            bits_per_sample: bits,
            channels: ((fmt & 0xF) + 1) as u8,
        })
    }

    /// Bytes one sample occupies in memory (20/24-bit samples sit in 32-bit containers).
    pub fn container_bytes(&self) -> u32 {
        match self.bits_per_sample {
            8 => 1,
            16 => 2,
            _ => 4,
        }
    }

    pub fn bytes_per_frame(&self) -> u32 {
        self.container_bytes() * u32::from(self.channels)
    }
}

/// The PCM size/rate parameter (0x0A) of a converter or function group.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PcmSupport(pub u32);

impl PcmSupport {
    pub fn supports_rate(&self, hz: u32) -> bool {
        rate_entry(hz).is_some_and(|entry| self.0 & (1 << entry.pcm_bit) != 0)
    }

    pub fn supports_bits(&self, bits: u8) -> bool {
        bits_entry(bits).is_some_and(|&(_, _, bit)| self.0 & (1 << bit) != 0)
    }

    pub fn supports(&self, hz: u32, bits: u8) -> bool {
        self.supports_rate(hz) && self.supports_bits(bits)
    }

    pub fn rates(&self) -> impl Iterator<Item = u32> + '_ {
        SUPPORTED_RATES
            .into_iter()
            .filter(move |hz| self.supports_rate(*hz))
    }

    pub fn bit_depths(&self) -> impl Iterator<Item = u8> + '_ {
        SUPPORTED_BITS
            .into_iter()
            .filter(move |bits| self.supports_bits(*bits))
    }

    /// Build a mask advertising the given rates and bit depths. Unknown values are ignored.
    pub fn from_lists(rates: &[u32], bits: &[u8]) -> Self {
        let mut mask = 0u32;
        for hz in rates {
            if let Some(entry) = rate_entry(*hz) {
                mask |= 1 << entry.pcm_bit;
            }
        }
        for b in bits {
            if let Some(&(_, _, bit)) = bits_entry(*b) {
                mask |= 1 << bit;
            }
        }
        Self(mask)
    }
}
