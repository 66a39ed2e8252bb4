//! Command transport: the CORB (outbound verbs) and RIRB (inbound responses) rings.

use tracing::{debug, trace, warn};

use crate::config::HdaConfig;
use crate::dma::DmaBuffer;
use crate::error::{HdaError, Result};
use crate::platform::{DmaLimit, Platform, Settle};
use crate::regs::*;
use crate::verb::{encode_command, RirbEntry, Verb};

const CORB_ENTRY_SIZE: usize = 4;
const RIRB_ENTRY_SIZE: usize = 8;

#[derive(Debug)]
pub struct CommandTransport {
    corb: DmaBuffer,
    rirb: DmaBuffer,
    corb_size: RingSize,
    rirb_size: RingSize,
    /// Last CORB slot written by software (mirrors CORBWP).
    corb_wp: u16,
    /// Last RIRB slot consumed by software (trails RIRBWP).
    rirb_rp: u16,
    retries: u32,
    retry_interval_us: u32,
}

impl CommandTransport {
    /// Size, allocate, program and start both rings.
    pub fn init<P: Platform>(
        platform: &P,
        caps: &ControllerCaps,
        config: &HdaConfig,
    ) -> Result<Self> {
        let settle = Settle {
            retries: config.register_settle_retries,
            interval_us: config.register_settle_interval_us,
        };
        stop_rings(platform, settle)?;

        let corb_size =
            RingSize::largest_supported(platform.read8(HDA_CORBSIZE)?, config.preferred_ring_size)
                .ok_or(HdaError::Unsupported("controller advertises no usable CORB size"))?;
        let rirb_size =
            RingSize::largest_supported(platform.read8(HDA_RIRBSIZE)?, config.preferred_ring_size)
                .ok_or(HdaError::Unsupported("controller advertises no usable RIRB size"))?;

        let limit = if caps.addr64 {
            DmaLimit::Any
        } else {
            DmaLimit::Below4G
        };
        let corb = DmaBuffer::alloc(
            platform,
            usize::from(corb_size.entries()) * CORB_ENTRY_SIZE,
            DMA_BASE_ALIGN,
            limit,
        )?;
        let rirb = match DmaBuffer::alloc(
            platform,
            usize::from(rirb_size.entries()) * RIRB_ENTRY_SIZE,
            DMA_BASE_ALIGN,
            limit,
        ) {
            Ok(rirb) => rirb,
            Err(err) => {
                corb.free(platform);
                return Err(err);
            }
        };

        let mut transport = Self {
            corb,
            rirb,
            corb_size,
            rirb_size,
            corb_wp: 0,
            rirb_rp: 0,
            retries: config.command_retries,
            retry_interval_us: config.command_retry_interval_us,
        };
        if let Err(err) = transport.program(platform, caps, settle) {
            transport.release(platform);
            return Err(err);
        }

        debug!(
            corb_entries = corb_size.entries(),
            rirb_entries = rirb_size.entries(),
            "command rings running"
        );
        Ok(transport)
    }

    fn program<P: Platform>(
        &mut self,
        platform: &P,
        caps: &ControllerCaps,
        settle: Settle,
    ) -> Result<()> {
        // CORB.
        let size_reg = platform.read8(HDA_CORBSIZE)?;
        platform.write8(HDA_CORBSIZE, (size_reg & !0x3) | self.corb_size.select_bits())?;
        write_base(platform, caps, HDA_CORBLBASE, HDA_CORBUBASE, self.corb.addr())?;

        platform.write16(HDA_CORBRP, CORBRP_RST)?;
        settle.wait(platform, "CORB read pointer reset", |p| {
            Ok(p.read16(HDA_CORBRP)? & CORBRP_RST != 0)
        })?;
        platform.write16(HDA_CORBRP, 0)?;
        settle.wait(platform, "CORB read pointer reset release", |p| {
            Ok(p.read16(HDA_CORBRP)? & CORBRP_RST == 0)
        })?;
        platform.write16(HDA_CORBWP, 0)?;
        self.corb_wp = 0;

        // RIRB.
        let size_reg = platform.read8(HDA_RIRBSIZE)?;
        platform.write8(HDA_RIRBSIZE, (size_reg & !0x3) | self.rirb_size.select_bits())?;
        write_base(platform, caps, HDA_RIRBLBASE, HDA_RIRBUBASE, self.rirb.addr())?;
        platform.write16(HDA_RIRBWP, RIRBWP_RST)?;
        platform.write16(HDA_RINTCNT, 1)?;
        self.rirb_rp = 0;

        platform.write8(HDA_CORBSTS, CORBSTS_CMEI)?;
        platform.write8(HDA_RIRBSTS, RIRBSTS_RINTFL | RIRBSTS_RIRBOIS)?;

        platform.write8(HDA_CORBCTL, CORBCTL_RUN)?;
        settle.wait(platform, "CORB start", |p| {
            Ok(p.read8(HDA_CORBCTL)? & CORBCTL_RUN != 0)
        })?;
        platform.write8(HDA_RIRBCTL, RIRBCTL_RUN)?;
        settle.wait(platform, "RIRB start", |p| {
            Ok(p.read8(HDA_RIRBCTL)? & RIRBCTL_RUN != 0)
        })?;
        Ok(())
    }

    pub fn corb_entries(&self) -> u16 {
        self.corb_size.entries()
    }

    pub fn rirb_entries(&self) -> u16 {
        self.rirb_size.entries()
    }

    /// Send `verbs` to node `nid` of codec `codec` and collect one response per verb, in order.
    ///
    /// At most `corb_entries - 1` verbs are in flight at once; longer batches are fed into the
    /// ring as the controller consumes it. Unsolicited responses and responses from other codecs
    /// are dropped.
    pub fn send_commands<P: Platform>(
        &mut self,
        platform: &P,
        codec: u8,
        nid: u8,
        verbs: &[Verb],
    ) -> Result<Vec<u32>> {
        if codec >= MAX_CODECS {
            return Err(HdaError::InvalidParameter("codec address out of range"));
        }
        if verbs.is_empty() {
            return Ok(Vec::new());
        }

        self.discard_stale_responses(platform)?;

        let corb_entries = self.corb_size.entries();
        let rirb_entries = self.rirb_size.entries();
        let mut responses = Vec::with_capacity(verbs.len());
        let mut sent = 0usize;
        let mut empty_polls = 0u32;

        loop {
            if sent < verbs.len() {
                let hw_rp = platform.read16(HDA_CORBRP)? & (corb_entries - 1);
                let first = sent;
                while sent < verbs.len() {
                    let next = (self.corb_wp + 1) % corb_entries;
                    if next == hw_rp {
                        // Ring full: one slot always stays empty.
                        break;
                    }
                    let cmd = encode_command(codec, nid, verbs[sent]);
                    self.corb
                        .write_u32(platform, usize::from(next) * CORB_ENTRY_SIZE, cmd)?;
                    self.corb_wp = next;
                    sent += 1;
                }
                if sent > first {
                    trace!(codec, nid, queued = sent - first, "CORB write pointer advanced");
                    platform.write16(HDA_CORBWP, self.corb_wp)?;
                }
            }

            let hw_wp = platform.read16(HDA_RIRBWP)? & (rirb_entries - 1);
            let mut progressed = false;
            while self.rirb_rp != hw_wp {
                self.rirb_rp = (self.rirb_rp + 1) % rirb_entries;
                let raw = self
                    .rirb
                    .read_u64(platform, usize::from(self.rirb_rp) * RIRB_ENTRY_SIZE)?;
                let entry = RirbEntry::decode(raw);
                if entry.is_unsolicited() || entry.codec() != codec {
                    debug!(
                        codec = entry.codec(),
                        unsolicited = entry.is_unsolicited(),
                        response = entry.response,
                        "dropping unexpected RIRB entry"
                    );
                    continue;
                }
                if responses.len() < sent {
                    responses.push(entry.response);
                    progressed = true;
                }
            }

            if responses.len() == verbs.len() {
                break;
            }

            if progressed {
                empty_polls = 0;
                continue;
            }
            empty_polls += 1;
            if empty_polls > self.retries {
                warn!(codec, nid, sent, answered = responses.len(), "codec command timed out");
                return Err(HdaError::Timeout {
                    codec,
                    retries: self.retries,
                });
            }
            platform.stall(self.retry_interval_us);
        }

        platform.write8(HDA_RIRBSTS, RIRBSTS_RINTFL | RIRBSTS_RIRBOIS)?;
        Ok(responses)
    }

    /// Skip over responses left behind by an earlier batch that timed out.
    fn discard_stale_responses<P: Platform>(&mut self, platform: &P) -> Result<()> {
        let hw_wp = platform.read16(HDA_RIRBWP)? & (self.rirb_size.entries() - 1);
        if hw_wp != self.rirb_rp {
            debug!(from = self.rirb_rp, to = hw_wp, "discarding stale RIRB entries");
            self.rirb_rp = hw_wp;
        }
        Ok(())
    }

    /// Stop both ring DMA engines and release their memory.
    pub fn shutdown<P: Platform>(self, platform: &P, config: &HdaConfig) -> Result<()> {
        let settle = Settle {
            retries: config.register_settle_retries,
            interval_us: config.register_settle_interval_us,
        };
        let stopped = stop_rings(platform, settle);
        self.release(platform);
        stopped
    }

    fn release<P: Platform>(self, platform: &P) {
        self.corb.free(platform);
        self.rirb.free(platform);
    }
}

fn stop_rings<P: Platform>(platform: &P, settle: Settle) -> Result<()> {
    platform.write8(HDA_CORBCTL, 0)?;
    settle.wait(platform, "CORB stop", |p| {
        Ok(p.read8(HDA_CORBCTL)? & CORBCTL_RUN == 0)
    })?;
    platform.write8(HDA_RIRBCTL, 0)?;
    settle.wait(platform, "RIRB stop", |p| {
        Ok(p.read8(HDA_RIRBCTL)? & RIRBCTL_RUN == 0)
    })
}

fn write_base<P: Platform>(
    platform: &P,
    caps: &ControllerCaps,
    lower: u32,
    upper: u32,
    addr: u64,
) -> Result<()> {
    platform.write32(lower, addr as u32)?;
    if caps.addr64 {
        platform.write32(upper, (addr >> 32) as u32)?;
    }
    Ok(())
}
