//! Services the driver consumes from the firmware platform.
//!
//! The bus layer hands the driver a mapped register window and a bus-master DMA allocator when
//! the controller is bound; the timer services reduce to a microsecond stall because every wait
//! in this driver is a bounded poll.

use crate::error::{HdaError, PlatformError};

/// Memory-mapped access to the controller's register BAR.
pub trait RegisterIo {
    fn mmio_read(&self, offset: u32, size: usize) -> Result<u32, PlatformError>;
    fn mmio_write(&self, offset: u32, size: usize, value: u32) -> Result<(), PlatformError>;

    fn read8(&self, offset: u32) -> Result<u8, PlatformError> {
        Ok(self.mmio_read(offset, 1)? as u8)
    }

    fn read16(&self, offset: u32) -> Result<u16, PlatformError> {
        Ok(self.mmio_read(offset, 2)? as u16)
    }

    fn read32(&self, offset: u32) -> Result<u32, PlatformError> {
        self.mmio_read(offset, 4)
    }

    fn write8(&self, offset: u32, value: u8) -> Result<(), PlatformError> {
        self.mmio_write(offset, 1, u32::from(value))
    }

    fn write16(&self, offset: u32, value: u16) -> Result<(), PlatformError> {
        self.mmio_write(offset, 2, u32::from(value))
    }

    fn write32(&self, offset: u32, value: u32) -> Result<(), PlatformError> {
        self.mmio_write(offset, 4, value)
    }
}

/// Addressing constraint for DMA allocations.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DmaLimit {
    /// The controller can only reach the low 4 GiB (GCAP.64OK clear).
    Below4G,
    Any,
}

/// Physically contiguous, device-visible memory.
pub trait DmaMemory {
    /// Allocate and map `len` bytes aligned to `align`, returning the device address.
    fn dma_alloc(&self, len: usize, align: usize, limit: DmaLimit) -> Result<u64, PlatformError>;
    fn dma_free(&self, addr: u64, len: usize);
    fn dma_read(&self, addr: u64, buf: &mut [u8]);
    fn dma_write(&self, addr: u64, buf: &[u8]);
}

pub trait Stall {
    fn stall(&self, micros: u32);
}

/// Everything a bound controller needs from the platform.
pub trait Platform: RegisterIo + DmaMemory + Stall {}

impl<T: RegisterIo + DmaMemory + Stall> Platform for T {}

/// Bounded register poll used while control bits settle (reset, ring run, stream reset).
#[derive(Debug, Copy, Clone)]
pub struct Settle {
    pub retries: u32,
    pub interval_us: u32,
}

impl Settle {
    /// Poll `done` until it reports true, stalling between attempts. Exhausting the budget is a
    /// `DeviceError` naming `what`.
    pub fn wait<P, F>(
        self,
        platform: &P,
        what: &'static str,
        mut done: F,
    ) -> crate::error::Result<()>
    where
        P: RegisterIo + Stall + ?Sized,
        F: FnMut(&P) -> Result<bool, PlatformError>,
    {
        for _ in 0..self.retries {
            if done(platform)? {
                return Ok(());
            }
            platform.stall(self.interval_us);
        }
        if done(platform)? {
            return Ok(());
        }
        tracing::warn!(what, retries = self.retries, "register did not settle");
        Err(HdaError::DeviceError(what))
    }
}
