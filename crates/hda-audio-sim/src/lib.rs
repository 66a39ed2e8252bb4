//! A simulated HDA controller and codecs behind the driver's platform traits.
//!
//! [`SimPlatform`] owns a register-level model ([`SimHda`]) and a window of physical memory.
//! Time only passes when the driver stalls, so every run is deterministic.

pub mod codec;
pub mod controller;
pub mod corb_rirb;
pub mod mem;
pub mod stream;

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use hda_audio::{DmaLimit, DmaMemory, PlatformError, RegisterIo, Stall};

pub use codec::{SimCodec, SimNode};
pub use controller::{Faults, LoggedVerb, SimHda};
pub use mem::PhysMemory;
pub use stream::SimStream;

/// Clones share one controller, so a test can keep a handle after moving the platform into the
/// driver.
#[derive(Debug, Clone)]
pub struct SimPlatform {
    hda: Rc<RefCell<SimHda>>,
}

impl SimPlatform {
    pub fn new(hda: SimHda) -> Self {
        Self {
            hda: Rc::new(RefCell::new(hda)),
        }
    }

    pub fn hda(&self) -> Ref<'_, SimHda> {
        self.hda.borrow()
    }

    pub fn hda_mut(&self) -> RefMut<'_, SimHda> {
        self.hda.borrow_mut()
    }

    /// Bytes output stream `index` has sent down the link since it last started.
    pub fn played(&self, index: usize) -> Vec<u8> {
        self.hda()
            .stream(index)
            .map(|stream| stream.played().to_vec())
            .unwrap_or_default()
    }

    pub fn pin_control(&self, codec: u8, nid: u8) -> Option<u8> {
        self.hda()
            .codec_model(codec)?
            .node(nid)
            .map(SimNode::pin_control)
    }

    pub fn live_allocations(&self) -> usize {
        self.hda().memory().live_allocations()
    }

    pub fn clock_us(&self) -> u64 {
        self.hda().clock_us()
    }
}

impl RegisterIo for SimPlatform {
    fn mmio_read(&self, offset: u32, size: usize) -> Result<u32, PlatformError> {
        self.hda().mmio_read(offset, size)
    }

    fn mmio_write(&self, offset: u32, size: usize, value: u32) -> Result<(), PlatformError> {
        self.hda_mut().mmio_write(offset, size, value)
    }
}

impl DmaMemory for SimPlatform {
    fn dma_alloc(&self, len: usize, align: usize, _limit: DmaLimit) -> Result<u64, PlatformError> {
        let mut hda = self.hda_mut();
        let limit_hit = hda
            .faults
            .dma_alloc_limit
            .is_some_and(|limit| hda.mem.total_allocations() >= limit);
        if limit_hit {
            return Err(PlatformError::OutOfMemory { len });
        }
        hda.mem
            .alloc(len, align)
            .ok_or(PlatformError::OutOfMemory { len })
    }

    fn dma_free(&self, addr: u64, len: usize) {
        if !self.hda_mut().mem.free(addr, len) {
            tracing::warn!(addr, len, "freeing memory that is not allocated");
        }
    }

    fn dma_read(&self, addr: u64, buf: &mut [u8]) {
        self.hda().mem.read_physical(addr, buf);
    }

    fn dma_write(&self, addr: u64, buf: &[u8]) {
        self.hda_mut().mem.write_physical(addr, buf);
    }
}

impl Stall for SimPlatform {
    fn stall(&self, micros: u32) {
        self.hda_mut().step(micros);
    }
}
