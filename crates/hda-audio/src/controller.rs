//! Controller bring-up and teardown, and the locked command path to its codecs.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::codec::{output_ports, Codec, OutputPort};
use crate::config::HdaConfig;
use crate::corb_rirb::CommandTransport;
use crate::error::{HdaError, Result};
use crate::platform::{Platform, Settle};
use crate::regs::*;
use crate::stream::{Stream, StreamDirection, StreamTags};
use crate::verb::{CommandSink, Verb};

/// Identifies a controller across boots well enough to key persisted settings on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DeviceKey {
    pub vendor_id: u16,
    pub device_id: u16,
    pub codec_mask: u16,
}

/// A bound HDA controller.
#[derive(Debug)]
pub struct Controller<P: Platform> {
    pub(crate) platform: P,
    pub(crate) config: HdaConfig,
    pub(crate) caps: ControllerCaps,
    version: (u8, u8),
    transport: Mutex<CommandTransport>,
    pub(crate) streams: Vec<Stream>,
    pub(crate) tags: StreamTags,
    codec_mask: u16,
    pub(crate) codecs: Vec<Codec>,
    pub(crate) outputs: Vec<OutputPort>,
}

impl<P: Platform> Controller<P> {
    /// Reset the controller, start the command rings, set up every stream descriptor and
    /// enumerate the codecs that answered the reset.
    pub fn bind(platform: P, config: HdaConfig) -> Result<Self> {
        config.validate()?;
        let settle = Settle {
            retries: config.register_settle_retries,
            interval_us: config.register_settle_interval_us,
        };

        let caps = ControllerCaps::from_gcap(platform.read16(HDA_GCAP)?);
        let version = (platform.read8(HDA_VMAJ)?, platform.read8(HDA_VMIN)?);
        debug!(?caps, major = version.0, minor = version.1, "controller capabilities");

        reset_controller(&platform, settle)?;
        platform.stall(config.codec_wake_us);
        let codec_mask = platform.read16(HDA_STATESTS)? & STATESTS_MASK;
        platform.write16(HDA_STATESTS, codec_mask)?;
        if codec_mask == 0 {
            warn!("no codec answered the controller reset");
        }

        let transport = CommandTransport::init(&platform, &caps, &config)?;
        let mut controller = Self {
            platform,
            config,
            caps,
            version,
            transport: Mutex::new(transport),
            streams: Vec::with_capacity(caps.total_streams()),
            tags: StreamTags::new(),
            codec_mask,
            codecs: Vec::new(),
            outputs: Vec::new(),
        };

        if let Err(err) = controller.init_streams() {
            controller.unbind();
            return Err(err);
        }

        for address in (0..MAX_CODECS).filter(|a| codec_mask & (1 << a) != 0) {
            match Codec::discover(&controller, address) {
                Ok(codec) => controller.codecs.push(codec),
                Err(err) => warn!(codec = address, %err, "codec enumeration failed; skipping"),
            }
        }
        controller.outputs = output_ports(&controller.codecs);

        info!(
            codecs = controller.codecs.len(),
            outputs = controller.outputs.len(),
            streams = controller.streams.len(),
            "HDA controller bound"
        );
        Ok(controller)
    }

    /// Descriptors are numbered inputs first, then outputs, then bidirectional.
    fn init_streams(&mut self) -> Result<()> {
        let layout = [
            (self.caps.input_streams, StreamDirection::Input),
            (self.caps.output_streams, StreamDirection::Output),
            (self.caps.bidir_streams, StreamDirection::Bidirectional),
        ];
        for (count, direction) in layout {
            for _ in 0..count {
                let index = self.streams.len();
                let stream =
                    Stream::new(&self.platform, index, direction, &self.caps, &self.config)?;
                self.streams.push(stream);
            }
        }
        Ok(())
    }

    /// Stop every stream and both rings, free all DMA memory and hand the platform back.
    ///
    /// Teardown is best effort: a register that refuses to settle is logged and the memory is
    /// released regardless.
    pub fn unbind(self) -> P {
        let Controller {
            platform,
            config,
            transport,
            streams,
            mut tags,
            ..
        } = self;

        for stream in streams {
            let index = stream.index();
            if let Err(err) = stream.teardown(&platform, &mut tags) {
                warn!(stream = index, %err, "stream teardown incomplete");
            }
        }
        let transport = transport.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = transport.shutdown(&platform, &config) {
            warn!(%err, "command ring shutdown incomplete");
        }
        info!("HDA controller unbound");
        platform
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &HdaConfig {
        &self.config
    }

    pub fn caps(&self) -> ControllerCaps {
        self.caps
    }

    /// (major, minor) from VMAJ/VMIN.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// STATESTS as sampled after reset: bit n set means a codec answered at address n.
    pub fn codec_mask(&self) -> u16 {
        self.codec_mask
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }

    pub fn codec(&self, address: u8) -> Option<&Codec> {
        self.codecs.iter().find(|c| c.address == address)
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn stream_tags(&self) -> StreamTags {
        self.tags
    }

    pub fn device_key(&self) -> Option<DeviceKey> {
        let codec = self.codecs.first()?;
        Some(DeviceKey {
            vendor_id: codec.vendor_id,
            device_id: codec.device_id,
            codec_mask: self.codec_mask,
        })
    }

    /// The stream used for playback: the first output descriptor, else the first bidirectional.
    pub(crate) fn playback_stream(&self) -> Result<usize> {
        self.streams
            .iter()
            .find(|s| s.direction() == StreamDirection::Output)
            .or_else(|| {
                self.streams
                    .iter()
                    .find(|s| s.direction() == StreamDirection::Bidirectional)
            })
            .map(Stream::index)
            .ok_or(HdaError::Unsupported("controller has no output-capable stream"))
    }
}

impl<P: Platform> CommandSink for Controller<P> {
    /// The transport lock is held for the whole exchange, retries included.
    fn send_commands(&self, codec: u8, nid: u8, verbs: &[Verb]) -> Result<Vec<u32>> {
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        transport.send_commands(&self.platform, codec, nid, verbs)
    }
}

/// Pulse GCTL.CRST: enter reset, wait for it to read back, leave reset, wait again.
fn reset_controller<P: Platform>(platform: &P, settle: Settle) -> Result<()> {
    let gctl = platform.read32(HDA_GCTL)?;
    platform.write32(HDA_GCTL, gctl & !GCTL_CRST)?;
    settle.wait(platform, "controller reset entry", |p| {
        Ok(p.read32(HDA_GCTL)? & GCTL_CRST == 0)
    })?;
    platform.write32(HDA_GCTL, gctl | GCTL_CRST)?;
    settle.wait(platform, "controller reset exit", |p| {
        Ok(p.read32(HDA_GCTL)? & GCTL_CRST != 0)
    })
}
