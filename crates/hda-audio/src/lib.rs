//! Polled Intel High Definition Audio driver for pre-OS environments.
//!
//! The driver resets the controller, drives codecs through the CORB/RIRB command rings, walks
//! each codec's widget graph and plays PCM through a BDL-described double buffer. Nothing is
//! interrupt driven: the caller (or the blocking playback path) polls.

pub mod codec;
pub mod config;
pub mod controller;
pub mod corb_rirb;
pub mod dma;
pub mod error;
pub mod format;
pub mod path;
pub mod platform;
pub mod playback;
pub mod regs;
pub mod stream;
pub mod verb;
pub mod widget;

pub use codec::{Codec, FunctionGroup, OutputPort};
pub use config::HdaConfig;
pub use controller::{Controller, DeviceKey};
pub use error::{HdaError, PlatformError, Result};
pub use format::{PcmSupport, StreamFormat};
pub use platform::{DmaLimit, DmaMemory, Platform, RegisterIo, Stall};
pub use playback::{PlaybackSession, PlaybackState};
pub use stream::PollOutcome;
pub use verb::{CommandSink, Verb};
