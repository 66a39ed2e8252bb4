//! Owned views over device-visible DMA memory.

use std::ops::Range;

use crate::error::{HdaError, Result};
use crate::platform::{DmaLimit, DmaMemory};

/// One physically contiguous allocation. Every CPU access is bounds-checked against `len`.
///
/// There is no `Drop`: releasing memory needs the platform, so owners call [`DmaBuffer::free`]
/// from their own teardown path.
#[derive(Debug)]
pub struct DmaBuffer {
    addr: u64,
    len: usize,
}

impl DmaBuffer {
    pub fn alloc(mem: &dyn DmaMemory, len: usize, align: usize, limit: DmaLimit) -> Result<Self> {
        if len == 0 {
            return Err(HdaError::InvalidParameter("zero-length DMA buffer"));
        }
        let addr = mem.dma_alloc(len, align, limit)?;
        if limit == DmaLimit::Below4G && addr.saturating_add(len as u64) > 1 << 32 {
            mem.dma_free(addr, len);
            return Err(HdaError::OutOfResources(
                "DMA buffer above 4 GiB on a 32-bit controller",
            ));
        }
        let buf = Self { addr, len };
        buf.fill(mem, 0..len, 0)?;
        Ok(buf)
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, range: &Range<usize>) -> Result<()> {
        if range.start > range.end || range.end > self.len {
            return Err(HdaError::InvalidParameter("DMA access out of bounds"));
        }
        Ok(())
    }

    pub fn write(&self, mem: &dyn DmaMemory, offset: usize, data: &[u8]) -> Result<()> {
        let range = offset..offset.saturating_add(data.len());
        self.check(&range)?;
        mem.dma_write(self.addr + offset as u64, data);
        Ok(())
    }

    pub fn read(&self, mem: &dyn DmaMemory, offset: usize, out: &mut [u8]) -> Result<()> {
        let range = offset..offset.saturating_add(out.len());
        self.check(&range)?;
        mem.dma_read(self.addr + offset as u64, out);
        Ok(())
    }

    pub fn fill(&self, mem: &dyn DmaMemory, range: Range<usize>, byte: u8) -> Result<()> {
        self.check(&range)?;
        if range.is_empty() {
            return Ok(());
        }
        let chunk = [byte; 256];
        let mut offset = range.start;
        while offset < range.end {
            let n = (range.end - offset).min(chunk.len());
            mem.dma_write(self.addr + offset as u64, &chunk[..n]);
            offset += n;
        }
        Ok(())
    }

    pub fn write_u32(&self, mem: &dyn DmaMemory, offset: usize, value: u32) -> Result<()> {
        self.write(mem, offset, &value.to_le_bytes())
    }

    pub fn read_u32(&self, mem: &dyn DmaMemory, offset: usize) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read(mem, offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&self, mem: &dyn DmaMemory, offset: usize) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(mem, offset, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn free(self, mem: &dyn DmaMemory) {
        mem.dma_free(self.addr, self.len);
    }
}

/// The two logical halves of a stream's cyclic buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Half {
    Lower,
    Upper,
}

impl Half {
    pub fn other(self) -> Half {
        match self {
            Half::Lower => Half::Upper,
            Half::Upper => Half::Lower,
        }
    }

    /// The half that contains byte `position` of a buffer of `total` bytes.
    pub fn containing(position: u32, total: usize) -> Half {
        if (position as usize % total.max(1)) < total / 2 {
            Half::Lower
        } else {
            Half::Upper
        }
    }

    pub fn range(self, total: usize) -> Range<usize> {
        let half = total / 2;
        match self {
            Half::Lower => 0..half,
            Half::Upper => half..total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use std::cell::RefCell;

    /// Flat memory starting at a fixed base address.
    struct FlatMem {
        base: u64,
        bytes: RefCell<Vec<u8>>,
        freed: RefCell<Vec<(u64, usize)>>,
    }

    impl FlatMem {
        fn new(base: u64, len: usize) -> Self {
            Self {
                base,
                bytes: RefCell::new(vec![0xAA; len]),
                freed: RefCell::new(Vec::new()),
            }
        }
    }

    impl DmaMemory for FlatMem {
        fn dma_alloc(
            &self,
            len: usize,
            _align: usize,
            _limit: DmaLimit,
        ) -> std::result::Result<u64, PlatformError> {
            if len > self.bytes.borrow().len() {
                return Err(PlatformError::OutOfMemory { len });
            }
            Ok(self.base)
        }

        fn dma_free(&self, addr: u64, len: usize) {
            self.freed.borrow_mut().push((addr, len));
        }

        fn dma_read(&self, addr: u64, buf: &mut [u8]) {
            let start = (addr - self.base) as usize;
            buf.copy_from_slice(&self.bytes.borrow()[start..start + buf.len()]);
        }

        fn dma_write(&self, addr: u64, buf: &[u8]) {
            let start = (addr - self.base) as usize;
            self.bytes.borrow_mut()[start..start + buf.len()].copy_from_slice(buf);
        }
    }

    #[test]
    fn alloc_zero_fills_and_bounds_checks() {
        let mem = FlatMem::new(0x1000, 1024);
        let buf = DmaBuffer::alloc(&mem, 512, 128, DmaLimit::Any).unwrap();
        assert_eq!(buf.read_u32(&mem, 0).unwrap(), 0);
        assert_eq!(buf.read_u32(&mem, 508).unwrap(), 0);
        // Bytes beyond the allocation keep their old contents.
        assert_eq!(mem.bytes.borrow()[512], 0xAA);

        assert!(buf.write(&mem, 510, &[1, 2, 3]).is_err());
        assert!(buf.fill(&mem, 500..513, 0).is_err());
        buf.write(&mem, 509, &[1, 2, 3]).unwrap();
    }

    #[test]
    fn below_4g_limit_rejects_high_allocations() {
        let mem = FlatMem::new(0xFFFF_FF00, 1024);
        let err = DmaBuffer::alloc(&mem, 512, 128, DmaLimit::Below4G).unwrap_err();
        assert!(matches!(err, HdaError::OutOfResources(_)));
        assert_eq!(*mem.freed.borrow(), vec![(0xFFFF_FF00, 512)]);
    }

    #[test]
    fn allocation_failure_is_out_of_resources() {
        let mem = FlatMem::new(0x1000, 64);
        let err = DmaBuffer::alloc(&mem, 512, 128, DmaLimit::Any).unwrap_err();
        assert!(matches!(err, HdaError::OutOfResources(_)));
    }

    #[test]
    fn halves_split_the_buffer() {
        assert_eq!(Half::Lower.range(64), 0..32);
        assert_eq!(Half::Upper.range(64), 32..64);
        assert_eq!(Half::containing(0, 64), Half::Lower);
        assert_eq!(Half::containing(31, 64), Half::Lower);
        assert_eq!(Half::containing(32, 64), Half::Upper);
        assert_eq!(Half::containing(64, 64), Half::Lower);
        assert_eq!(Half::Lower.other(), Half::Upper);
    }
}
