use serde::{Deserialize, Serialize};

use crate::error::{HdaError, Result};
use crate::regs::{RingSize, DMA_BASE_ALIGN};

/// Driver tuning knobs. Every field has a default, so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HdaConfig {
    /// Consecutive empty RIRB polls tolerated before a command batch times out.
    pub command_retries: u32,
    pub command_retry_interval_us: u32,
    /// Polls allowed for reset, ring and stream control bits to settle.
    pub register_settle_retries: u32,
    pub register_settle_interval_us: u32,
    /// Wait after leaving controller reset before codec presence is sampled (at least 521us).
    pub codec_wake_us: u32,
    /// Buffer descriptor list entries per stream. Must be even so the list splits in halves.
    pub bdl_entries: u16,
    /// Bytes per BDL entry.
    pub block_size: u32,
    pub poll_interval_us: u32,
    /// Playback polls without DMA progress before the blocking wait gives up.
    pub stall_watchdog_polls: u32,
    pub preferred_ring_size: RingSize,
}

impl Default for HdaConfig {
    fn default() -> Self {
        Self {
            command_retries: 1000,
            command_retry_interval_us: 10,
            register_settle_retries: 1000,
            register_settle_interval_us: 10,
            codec_wake_us: 1000,
            bdl_entries: 8,
            block_size: 4096,
            poll_interval_us: 1000,
            stall_watchdog_polls: 500,
            preferred_ring_size: RingSize::Entries256,
        }
    }
}

impl HdaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_retries == 0 || self.register_settle_retries == 0 {
            return Err(HdaError::InvalidParameter("retry budgets must be non-zero"));
        }
        if self.bdl_entries < 2 || self.bdl_entries > 256 || self.bdl_entries % 2 != 0 {
            return Err(HdaError::InvalidParameter(
                "bdl_entries must be even and within 2..=256",
            ));
        }
        if self.block_size == 0 || self.block_size as usize % DMA_BASE_ALIGN != 0 {
            return Err(HdaError::InvalidParameter(
                "block_size must be a non-zero multiple of 128",
            ));
        }
        if self.poll_interval_us == 0 {
            return Err(HdaError::InvalidParameter("poll_interval_us must be non-zero"));
        }
        if self.codec_wake_us < 521 {
            return Err(HdaError::InvalidParameter("codec_wake_us must be at least 521"));
        }
        Ok(())
    }

    /// Bytes in one stream's cyclic DMA buffer.
    pub fn stream_buffer_len(&self) -> usize {
        usize::from(self.bdl_entries) * self.block_size as usize
    }
}
