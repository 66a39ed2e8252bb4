//! Stream descriptors: BDL double buffering and poll-driven refill.

use tracing::{debug, trace, warn};

use crate::config::HdaConfig;
use crate::dma::{DmaBuffer, Half};
use crate::error::{HdaError, Result};
use crate::format::StreamFormat;
use crate::platform::{DmaLimit, Platform, Settle};
use crate::regs::*;

const BDL_FLAG_IOC: u32 = 1 << 0;
const MAX_STREAM_TAG: u8 = 15;

/// Allocation bitmap for the 15 usable stream tags (0 means "no tag").
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct StreamTags(u16);

impl StreamTags {
    pub fn new() -> Self {
        Self(0)
    }

    /// Claim the lowest free tag.
    pub fn allocate(&mut self) -> Result<u8> {
        let tag = (1..=MAX_STREAM_TAG)
            .find(|tag| self.0 & (1 << tag) == 0)
            .ok_or(HdaError::OutOfResources("all 15 stream tags are in use"))?;
        self.0 |= 1 << tag;
        Ok(tag)
    }

    pub fn release(&mut self, tag: u8) {
        if (1..=MAX_STREAM_TAG).contains(&tag) {
            self.0 &= !(1 << tag);
        }
    }

    pub fn is_allocated(&self, tag: u8) -> bool {
        (1..=MAX_STREAM_TAG).contains(&tag) && self.0 & (1 << tag) != 0
    }

    pub fn in_use(&self) -> u32 {
        self.0.count_ones()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StreamDirection {
    Input,
    Output,
    Bidirectional,
}

/// Which half of the cyclic buffer the next completion is expected to free.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RefillState {
    AwaitingLowerHalf,
    AwaitingUpperHalf,
}

impl RefillState {
    fn half(self) -> Half {
        match self {
            RefillState::AwaitingLowerHalf => Half::Lower,
            RefillState::AwaitingUpperHalf => Half::Upper,
        }
    }

    fn after(half: Half) -> Self {
        match half {
            Half::Lower => RefillState::AwaitingUpperHalf,
            Half::Upper => RefillState::AwaitingLowerHalf,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PollOutcome {
    /// The stream is not armed.
    Idle,
    /// No half completed since the last poll.
    Pending,
    /// A half completed and was refilled (output) or drained (input).
    Refilled(Half),
    /// Every source byte has been played (or the capture target is full); the stream is stopped.
    Completed,
}

/// One hardware stream descriptor with its BDL and cyclic DMA buffer.
#[derive(Debug)]
pub struct Stream {
    index: usize,
    direction: StreamDirection,
    base: u32,
    bdl: DmaBuffer,
    buffer: DmaBuffer,
    bdl_entries: u16,
    block_size: u32,
    settle: Settle,

    tag: u8,
    format: Option<StreamFormat>,

    /// Output: bytes to play. Input: bytes captured so far.
    source: Vec<u8>,
    /// Output: bytes copied into DMA memory so far.
    cursor: usize,
    capture_len: usize,
    refill: RefillState,
    /// Half holding the final source bytes, once they have been copied into DMA memory.
    tail: Option<Half>,
    armed: bool,
}

impl Stream {
    /// Allocate the descriptor list and buffer for stream descriptor `index` and program them.
    pub fn new<P: Platform>(
        platform: &P,
        index: usize,
        direction: StreamDirection,
        caps: &ControllerCaps,
        config: &HdaConfig,
    ) -> Result<Self> {
        let limit = if caps.addr64 {
            DmaLimit::Any
        } else {
            DmaLimit::Below4G
        };
        let bdl = DmaBuffer::alloc(
            platform,
            usize::from(config.bdl_entries) * BDL_ENTRY_SIZE,
            DMA_BASE_ALIGN,
            limit,
        )?;
        let buffer =
            match DmaBuffer::alloc(platform, config.stream_buffer_len(), DMA_BASE_ALIGN, limit) {
                Ok(buffer) => buffer,
                Err(err) => {
                    bdl.free(platform);
                    return Err(err);
                }
            };

        let stream = Self {
            index,
            direction,
            base: stream_base(index),
            bdl,
            buffer,
            bdl_entries: config.bdl_entries,
            block_size: config.block_size,
            settle: Settle {
                retries: config.register_settle_retries,
                interval_us: config.register_settle_interval_us,
            },
            tag: 0,
            format: None,
            source: Vec::new(),
            cursor: 0,
            capture_len: 0,
            refill: RefillState::AwaitingLowerHalf,
            tail: None,
            armed: false,
        };
        if let Err(err) = stream.write_bdl(platform).and_then(|_| stream.program(platform, caps)) {
            stream.free(platform);
            return Err(err);
        }
        Ok(stream)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn refill_state(&self) -> RefillState {
        self.refill
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Output source bytes copied into DMA memory so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Fill in the descriptor list: equal blocks, IOC on the last block of each half.
    fn write_bdl<P: Platform>(&self, platform: &P) -> Result<()> {
        let half_entries = self.bdl_entries / 2;
        for i in 0..self.bdl_entries {
            let at = usize::from(i) * BDL_ENTRY_SIZE;
            let addr = self.buffer.addr() + u64::from(i) * u64::from(self.block_size);
            let flags = if i + 1 == half_entries || i + 1 == self.bdl_entries {
                BDL_FLAG_IOC
            } else {
                0
            };
            let mut entry = [0u8; BDL_ENTRY_SIZE];
            entry[0..8].copy_from_slice(&addr.to_le_bytes());
            entry[8..12].copy_from_slice(&self.block_size.to_le_bytes());
            entry[12..16].copy_from_slice(&flags.to_le_bytes());
            self.bdl.write(platform, at, &entry)?;
        }
        Ok(())
    }

    /// Reset the descriptor and point it at our BDL.
    fn program<P: Platform>(&self, platform: &P, caps: &ControllerCaps) -> Result<()> {
        self.reset(platform)?;
        platform.write32(self.base + SD_BDPL, self.bdl.addr() as u32)?;
        if caps.addr64 {
            platform.write32(self.base + SD_BDPU, (self.bdl.addr() >> 32) as u32)?;
        }
        platform.write32(self.base + SD_CBL, self.buffer.len() as u32)?;
        platform.write16(self.base + SD_LVI, self.bdl_entries - 1)?;
        Ok(())
    }

    fn read_ctl<P: Platform>(&self, platform: &P) -> Result<u32> {
        Ok(platform.read32(self.base + SD_CTL)? & 0x00FF_FFFF)
    }

    /// The status byte shares the dword with CTL; writing zeros there leaves W1C bits alone.
    fn write_ctl<P: Platform>(&self, platform: &P, ctl: u32) -> Result<()> {
        platform.write32(self.base + SD_CTL, ctl & 0x00FF_FFFF)?;
        Ok(())
    }

    /// SRST handshake: enter reset, wait for the bit to read back, leave reset, wait again.
    fn reset<P: Platform>(&self, platform: &P) -> Result<()> {
        let ctl = self.read_ctl(platform)? & !SD_CTL_RUN;
        self.write_ctl(platform, ctl)?;
        self.write_ctl(platform, ctl | SD_CTL_SRST)?;
        let base = self.base;
        self.settle.wait(platform, "stream reset entry", |p| {
            Ok(p.read32(base + SD_CTL)? & SD_CTL_SRST != 0)
        })?;
        self.write_ctl(platform, ctl & !SD_CTL_SRST)?;
        self.settle.wait(platform, "stream reset exit", |p| {
            Ok(p.read32(base + SD_CTL)? & SD_CTL_SRST == 0)
        })?;
        platform.write8(self.base + SD_STS, SD_STS_BCIS | SD_STS_FIFOE | SD_STS_DESE)?;
        Ok(())
    }

    /// Claim a tag, reset the descriptor and program the sample format.
    pub fn configure<P: Platform>(
        &mut self,
        platform: &P,
        caps: &ControllerCaps,
        tags: &mut StreamTags,
        format: StreamFormat,
    ) -> Result<u8> {
        if self.tag != 0 {
            return Err(HdaError::AlreadyStarted {
                stream: self.index,
                tag: self.tag,
            });
        }
        let fmt = format.to_hda_fmt()?;
        let tag = tags.allocate()?;

        let programmed = self
            .program(platform, caps)
            .and_then(|_| platform.write16(self.base + SD_FMT, fmt).map_err(HdaError::from));
        if let Err(err) = programmed {
            tags.release(tag);
            return Err(err);
        }

        self.tag = tag;
        self.format = Some(format);
        debug!(stream = self.index, tag, fmt, "stream configured");
        Ok(tag)
    }

    /// Start an output transfer of `source[offset..]`.
    pub fn start<P: Platform>(&mut self, platform: &P, source: &[u8], offset: usize) -> Result<()> {
        if self.direction == StreamDirection::Input {
            return Err(HdaError::InvalidParameter("input stream cannot play"));
        }
        if offset > source.len() {
            return Err(HdaError::InvalidParameter("start offset past end of source"));
        }
        self.begin(platform, source[offset..].to_vec())?;

        let total = self.buffer.len();
        let n = self.source.len().min(total);
        self.buffer.write(platform, 0, &self.source[..n])?;
        self.buffer.fill(platform, n..total, 0)?;
        self.cursor = n;
        if self.cursor >= self.source.len() {
            self.tail = Some(Half::containing(n.saturating_sub(1) as u32, total));
        }

        self.run(platform, true)
    }

    /// Start capturing `len` bytes into an owned buffer, retrieved with [`Stream::take_captured`].
    pub fn start_capture<P: Platform>(&mut self, platform: &P, len: usize) -> Result<()> {
        if self.direction == StreamDirection::Output {
            return Err(HdaError::InvalidParameter("output stream cannot capture"));
        }
        if len == 0 {
            return Err(HdaError::InvalidParameter("empty capture"));
        }
        self.begin(platform, Vec::with_capacity(len))?;
        self.capture_len = len;
        self.buffer.fill(platform, 0..self.buffer.len(), 0)?;
        self.run(platform, false)
    }

    fn begin<P: Platform>(&mut self, platform: &P, source: Vec<u8>) -> Result<()> {
        if self.tag == 0 {
            return Err(HdaError::NotReady("stream has no tag; configure it first"));
        }
        if self.is_running(platform)? {
            return Err(HdaError::AlreadyStarted {
                stream: self.index,
                tag: self.tag,
            });
        }
        self.source = source;
        self.cursor = 0;
        self.tail = None;
        self.refill = RefillState::AwaitingLowerHalf;
        Ok(())
    }

    fn run<P: Platform>(&mut self, platform: &P, output: bool) -> Result<()> {
        platform.write8(self.base + SD_STS, SD_STS_BCIS | SD_STS_FIFOE | SD_STS_DESE)?;
        let mut ctl = self.read_ctl(platform)? & !(SD_CTL_STRM_MASK | SD_CTL_DIR);
        ctl |= u32::from(self.tag) << SD_CTL_STRM_SHIFT;
        if output && self.direction == StreamDirection::Bidirectional {
            ctl |= SD_CTL_DIR;
        }
        ctl |= SD_CTL_RUN | SD_CTL_IOCE;
        self.armed = true;
        self.write_ctl(platform, ctl)?;
        debug!(stream = self.index, tag = self.tag, bytes = self.source.len(), "stream running");
        Ok(())
    }

    pub fn is_running<P: Platform>(&self, platform: &P) -> Result<bool> {
        Ok(self.read_ctl(platform)? & SD_CTL_RUN != 0)
    }

    /// Current DMA position in the cyclic buffer (LPIB).
    pub fn position<P: Platform>(&self, platform: &P) -> Result<u32> {
        Ok(platform.read32(self.base + SD_LPIB)?)
    }

    /// Service one completion if the hardware signalled one.
    pub fn poll<P: Platform>(&mut self, platform: &P) -> Result<PollOutcome> {
        if !self.armed {
            return Ok(PollOutcome::Idle);
        }
        let sts = platform.read8(self.base + SD_STS)?;
        if sts & SD_STS_BCIS == 0 {
            return Ok(PollOutcome::Pending);
        }

        let total = self.buffer.len();
        let lpib = self.position(platform)?;
        let free = Half::containing(lpib, total).other();
        if free != self.refill.half() {
            warn!(
                stream = self.index,
                expected = ?self.refill.half(),
                actual = ?free,
                lpib,
                "half completion missed"
            );
        }

        let done = if self.direction == StreamDirection::Input {
            self.drain_half(platform, free)?
        } else {
            self.refill_half(platform, free)?
        };
        if done {
            self.stop(platform)?;
            platform.write8(self.base + SD_STS, SD_STS_BCIS)?;
            debug!(stream = self.index, "stream completed");
            return Ok(PollOutcome::Completed);
        }

        self.refill = RefillState::after(free);
        platform.write8(self.base + SD_STS, SD_STS_BCIS)?;
        trace!(stream = self.index, half = ?free, cursor = self.cursor, "half serviced");
        Ok(PollOutcome::Refilled(free))
    }

    /// Returns true once the half that held the last source bytes has been played out.
    fn refill_half<P: Platform>(&mut self, platform: &P, free: Half) -> Result<bool> {
        if self.tail == Some(free) {
            return Ok(true);
        }
        let range = free.range(self.buffer.len());
        let remaining = self.source.len().saturating_sub(self.cursor);
        let n = remaining.min(range.len());
        if n > 0 {
            let chunk = &self.source[self.cursor..self.cursor + n];
            self.buffer.write(platform, range.start, chunk)?;
            self.cursor += n;
            if self.cursor >= self.source.len() {
                self.tail = Some(free);
            }
        }
        self.buffer.fill(platform, range.start + n..range.end, 0)?;
        Ok(false)
    }

    /// Returns true once the capture target is full.
    fn drain_half<P: Platform>(&mut self, platform: &P, free: Half) -> Result<bool> {
        let range = free.range(self.buffer.len());
        let n = self.capture_len.saturating_sub(self.source.len()).min(range.len());
        let mut chunk = vec![0u8; n];
        self.buffer.read(platform, range.start, &mut chunk)?;
        self.source.extend_from_slice(&chunk);
        Ok(self.source.len() >= self.capture_len)
    }

    /// Bytes captured so far; empties the capture buffer.
    pub fn take_captured(&mut self) -> Vec<u8> {
        if self.direction == StreamDirection::Output || self.armed {
            return Vec::new();
        }
        std::mem::take(&mut self.source)
    }

    /// Disarm and halt DMA. The tag stays assigned.
    pub fn stop<P: Platform>(&mut self, platform: &P) -> Result<()> {
        self.armed = false;
        if self.direction != StreamDirection::Input {
            self.source = Vec::new();
        }
        self.cursor = 0;
        self.tail = None;
        let ctl = self.read_ctl(platform)?;
        self.write_ctl(platform, ctl & !SD_CTL_RUN)?;
        let base = self.base;
        self.settle.wait(platform, "stream stop", |p| {
            Ok(p.read32(base + SD_CTL)? & SD_CTL_RUN == 0)
        })
    }

    /// Give the tag back, stopping DMA first if it still runs. The tag is returned even when
    /// the descriptor cannot be read or stopped.
    pub fn release<P: Platform>(&mut self, platform: &P, tags: &mut StreamTags) -> Result<()> {
        let stopped = match self.is_running(platform) {
            Ok(true) => self.stop(platform),
            Ok(false) => Ok(()),
            Err(err) => {
                self.armed = false;
                Err(err)
            }
        };
        if self.tag != 0 {
            tags.release(self.tag);
            debug!(stream = self.index, tag = self.tag, "stream tag released");
        }
        self.tag = 0;
        self.format = None;
        stopped
    }

    /// Stop, reset and free the descriptor's memory.
    pub fn teardown<P: Platform>(mut self, platform: &P, tags: &mut StreamTags) -> Result<()> {
        let result = self
            .release(platform, tags)
            .and_then(|_| self.reset(platform));
        self.free(platform);
        result
    }

    fn free<P: Platform>(self, platform: &P) {
        self.bdl.free(platform);
        self.buffer.free(platform);
    }
}
