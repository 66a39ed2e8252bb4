//! Simulated physical memory with a bump allocator that remembers what is still mapped.

use std::collections::BTreeMap;

/// A flat window of "physical" memory starting at `base`.
///
/// Accesses outside the window read as zero and drop writes, like an unbacked bus.
#[derive(Debug)]
pub struct PhysMemory {
    base: u64,
    bytes: Vec<u8>,
    next: u64,
    live: BTreeMap<u64, usize>,
    total_allocs: usize,
}

impl PhysMemory {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
            next: base,
            live: BTreeMap::new(),
            total_allocs: 0,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    fn range(&self, addr: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = addr.checked_sub(self.base)?;
        let start = usize::try_from(start).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    pub fn read_physical(&self, addr: u64, buf: &mut [u8]) {
        match self.range(addr, buf.len()) {
            Some(range) => buf.copy_from_slice(&self.bytes[range]),
            None => buf.fill(0),
        }
    }

    pub fn write_physical(&mut self, addr: u64, buf: &[u8]) {
        if let Some(range) = self.range(addr, buf.len()) {
            self.bytes[range].copy_from_slice(buf);
        }
    }

    pub fn read_u32(&self, addr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(addr, &mut buf);
        u32::from_le_bytes(buf)
    }

    pub fn read_u64(&self, addr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read_physical(addr, &mut buf);
        u64::from_le_bytes(buf)
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) {
        self.write_physical(addr, &value.to_le_bytes());
    }

    /// Bump-allocate `len` bytes aligned to `align`. Freed space is not reused.
    pub fn alloc(&mut self, len: usize, align: usize) -> Option<u64> {
        let align = align.max(1) as u64;
        let addr = self.next.checked_add(align - 1)? / align * align;
        let end = addr.checked_add(len as u64)?;
        self.range(addr, len)?;
        self.next = end;
        self.live.insert(addr, len);
        self.total_allocs += 1;
        Some(addr)
    }

    /// Returns false when `addr`/`len` does not name a live allocation.
    pub fn free(&mut self, addr: u64, len: usize) -> bool {
        match self.live.get(&addr) {
            Some(&live_len) if live_len == len => {
                self.live.remove(&addr);
                true
            }
            _ => false,
        }
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocs
    }
}
