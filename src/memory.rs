use core::fmt;

use crate::constants::*;
use crate::error::{Result, VmError};
use crate::process::Pid;

/// Index of a physical frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Start of this frame in the physical memory buffer
    #[inline]
    pub fn base_address(self) -> usize {
        self.index() * PAGE_SIZE
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of one physical frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub allocated: bool,
    pub owner: Option<Pid>,
    pub virtual_page: u32,
    pub dirty: bool,
    pub last_access: u64,
}

/// Packed allocation bitmap, one bit per frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBitmap {
    words: Vec<u64>,
    len: usize,
}

impl FrameBitmap {
    pub fn new(len: usize) -> Self {
        FrameBitmap { words: vec![0; len.div_ceil(64)], len }
    }

    pub fn from_words(words: Vec<u64>, len: usize) -> Option<Self> {
        if words.len() != len.div_ceil(64) {
            return None;
        }
        Some(FrameBitmap { words, len })
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        let mask = 1u64 << (index % 64);
        if value {
            self.words[index / 64] |= mask;
        } else {
            self.words[index / 64] &= !mask;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Physical memory: frame descriptors, their bitmap and the backing bytes.
///
/// Never evicts on its own; callers go to the replacement engine when
/// [`allocate_frame`](Self::allocate_frame) fails.
pub struct PhysicalFrameTable {
    frames: Vec<Frame>,
    bitmap: FrameBitmap,
    data: Vec<u8>,
    free_count: usize,
    clock: u64,
}

impl PhysicalFrameTable {
    /// Create a table of `num_frames` zeroed, unallocated frames
    pub fn new(num_frames: usize) -> Self {
        PhysicalFrameTable {
            frames: vec![Frame::default(); num_frames],
            bitmap: FrameBitmap::new(num_frames),
            data: vec![0u8; num_frames * PAGE_SIZE],
            free_count: num_frames,
            clock: 0,
        }
    }

    /// Rebuild a table from saved parts. The free count is derived from the frames.
    pub fn from_parts(
        frames: Vec<Frame>,
        bitmap: FrameBitmap,
        data: Vec<u8>,
        clock: u64,
    ) -> Result<Self> {
        if bitmap.len() != frames.len() || data.len() != frames.len() * PAGE_SIZE {
            return Err(VmError::InconsistentState(format!(
                "frame table parts disagree: {} frames, {} bitmap bits, {} bytes",
                frames.len(),
                bitmap.len(),
                data.len()
            )));
        }
        let free_count = frames.iter().filter(|f| !f.allocated).count();
        let table = PhysicalFrameTable { frames, bitmap, data, free_count, clock };
        table.check_state()?;
        Ok(table)
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn allocated_count(&self) -> usize {
        self.frames.len() - self.free_count
    }

    /// Current value of the logical access clock
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Advance the logical clock and return the new timestamp
    pub fn stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn check_frame(&self, frame: FrameId) -> Result<()> {
        if frame.index() < self.frames.len() {
            Ok(())
        } else {
            Err(VmError::InvalidFrame(frame))
        }
    }

    fn check_allocated(&self, frame: FrameId) -> Result<()> {
        self.check_frame(frame)?;
        if self.frames[frame.index()].allocated {
            Ok(())
        } else {
            Err(VmError::InvalidFrame(frame))
        }
    }

    /// Claim the lowest-numbered free frame for `(pid, vpage)`
    pub fn allocate_frame(&mut self, pid: Pid, vpage: u32) -> Result<FrameId> {
        let index = self
            .frames
            .iter()
            .position(|f| !f.allocated)
            .ok_or(VmError::OutOfPhysicalMemory)?;

        let now = self.stamp();
        let frame = &mut self.frames[index];
        frame.allocated = true;
        frame.owner = Some(pid);
        frame.virtual_page = vpage;
        frame.dirty = false;
        frame.last_access = now;
        self.bitmap.set(index, true);
        self.free_count -= 1;

        Ok(FrameId(index as u32))
    }

    /// Release a frame. Freeing an already free frame does nothing.
    pub fn free_frame(&mut self, frame: FrameId) -> Result<()> {
        self.check_frame(frame)?;
        let index = frame.index();
        if !self.frames[index].allocated {
            return Ok(());
        }

        self.frames[index] = Frame::default();
        self.bitmap.set(index, false);
        self.free_count += 1;
        Ok(())
    }

    pub fn frame(&self, frame: FrameId) -> Result<&Frame> {
        self.check_frame(frame)?;
        Ok(&self.frames[frame.index()])
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn bitmap(&self) -> &FrameBitmap {
        &self.bitmap
    }

    /// The whole physical memory buffer
    pub fn physical_memory(&self) -> &[u8] {
        &self.data
    }

    /// Refresh the frame's access time and return the stamp used
    pub fn touch(&mut self, frame: FrameId) -> Result<u64> {
        self.check_allocated(frame)?;
        let now = self.stamp();
        self.frames[frame.index()].last_access = now;
        Ok(now)
    }

    pub fn set_dirty(&mut self, frame: FrameId, dirty: bool) -> Result<()> {
        self.check_allocated(frame)?;
        self.frames[frame.index()].dirty = dirty;
        Ok(())
    }

    fn check_range(offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= PAGE_SIZE => Ok(()),
            _ => Err(VmError::OutOfBounds { offset, len }),
        }
    }

    /// Copy `buf.len()` bytes out of an allocated frame
    pub fn read_physical_memory(
        &self,
        frame: FrameId,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        self.check_allocated(frame)?;
        Self::check_range(offset, buf.len())?;
        let start = frame.base_address() + offset;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    /// Copy bytes into an allocated frame, marking it dirty
    pub fn write_physical_memory(
        &mut self,
        frame: FrameId,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        self.check_allocated(frame)?;
        Self::check_range(offset, data.len())?;
        let start = frame.base_address() + offset;
        self.data[start..start + data.len()].copy_from_slice(data);

        let now = self.stamp();
        let entry = &mut self.frames[frame.index()];
        entry.dirty = true;
        entry.last_access = now;
        Ok(())
    }

    /// The full contents of an allocated frame
    pub fn page(&self, frame: FrameId) -> Result<&[u8]> {
        self.check_allocated(frame)?;
        let start = frame.base_address();
        Ok(&self.data[start..start + PAGE_SIZE])
    }

    /// Overwrite a whole page without touching the dirty bit (used by swap-in)
    pub fn load_page(&mut self, frame: FrameId, contents: &[u8]) -> Result<()> {
        self.check_allocated(frame)?;
        if contents.len() != PAGE_SIZE {
            return Err(VmError::OutOfBounds { offset: 0, len: contents.len() });
        }
        let start = frame.base_address();
        self.data[start..start + PAGE_SIZE].copy_from_slice(contents);
        Ok(())
    }

    pub fn zero_frame(&mut self, frame: FrameId) -> Result<()> {
        self.check_allocated(frame)?;
        let start = frame.base_address();
        self.data[start..start + PAGE_SIZE].fill(0);
        Ok(())
    }

    /// Verify bitmap/descriptor agreement and the free count.
    ///
    /// Reports the first mismatch instead of repairing it.
    pub fn check_state(&self) -> Result<()> {
        let mut allocated = 0;
        for (i, frame) in self.frames.iter().enumerate() {
            if self.bitmap.get(i) != frame.allocated {
                return Err(VmError::InconsistentState(format!(
                    "frame {} bitmap={} allocated={}",
                    i,
                    self.bitmap.get(i),
                    frame.allocated
                )));
            }
            if frame.allocated {
                allocated += 1;
            } else if frame.owner.is_some() || frame.dirty {
                return Err(VmError::InconsistentState(format!(
                    "free frame {} still carries owner or dirty bit",
                    i
                )));
            }
        }
        if allocated + self.free_count != self.frames.len() {
            return Err(VmError::InconsistentState(format!(
                "free count {} + allocated {} != {} frames",
                self.free_count,
                allocated,
                self.frames.len()
            )));
        }
        Ok(())
    }
}

impl Default for PhysicalFrameTable {
    fn default() -> Self {
        Self::new(PHYSICAL_PAGES)
    }
}
