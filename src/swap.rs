use core::fmt;

use crate::constants::*;
use crate::error::{Result, VmError};
use crate::process::Pid;

/// Index of a block in the swap area
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapIndex(pub u32);

impl SwapIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SwapIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapBlock {
    pub used: bool,
    pub owner: Option<Pid>,
    pub virtual_page: u32,
}

/// Disk-backed swap area: block descriptors plus one page of bytes per block
pub struct SwapSpace {
    blocks: Vec<SwapBlock>,
    area: Vec<u8>,
    free_count: usize,
    disk_reads: u64,
    disk_writes: u64,
}

impl SwapSpace {
    pub fn new(num_blocks: usize) -> Self {
        SwapSpace {
            blocks: vec![SwapBlock::default(); num_blocks],
            area: vec![0u8; num_blocks * PAGE_SIZE],
            free_count: num_blocks,
            disk_reads: 0,
            disk_writes: 0,
        }
    }

    pub fn from_parts(
        blocks: Vec<SwapBlock>,
        area: Vec<u8>,
        disk_reads: u64,
        disk_writes: u64,
    ) -> Result<Self> {
        if area.len() != blocks.len() * PAGE_SIZE {
            return Err(VmError::InconsistentState(format!(
                "swap area holds {} bytes for {} blocks",
                area.len(),
                blocks.len()
            )));
        }
        let free_count = blocks.iter().filter(|b| !b.used).count();
        Ok(SwapSpace { blocks, area, free_count, disk_reads, disk_writes })
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free_count
    }

    pub fn used_blocks(&self) -> usize {
        self.blocks.len() - self.free_count
    }

    pub fn disk_reads(&self) -> u64 {
        self.disk_reads
    }

    pub fn disk_writes(&self) -> u64 {
        self.disk_writes
    }

    pub fn blocks(&self) -> &[SwapBlock] {
        &self.blocks
    }

    /// Raw swap backing buffer
    pub fn area(&self) -> &[u8] {
        &self.area
    }

    pub fn block(&self, idx: SwapIndex) -> Result<&SwapBlock> {
        self.blocks.get(idx.index()).ok_or(VmError::InvalidSwapBlock(idx))
    }

    fn check_used(&self, idx: SwapIndex) -> Result<()> {
        match self.blocks.get(idx.index()) {
            Some(block) if block.used => Ok(()),
            _ => Err(VmError::InvalidSwapBlock(idx)),
        }
    }

    /// First-fit claim of a block for `(pid, vpage)`
    pub fn allocate_swap_block(&mut self, pid: Pid, vpage: u32) -> Result<SwapIndex> {
        let index = self
            .blocks
            .iter()
            .position(|b| !b.used)
            .ok_or(VmError::OutOfSwapSpace)?;

        let block = &mut self.blocks[index];
        block.used = true;
        block.owner = Some(pid);
        block.virtual_page = vpage;
        self.free_count -= 1;

        Ok(SwapIndex(index as u32))
    }

    /// Release a block. Already free blocks are left alone.
    pub fn free_swap_block(&mut self, idx: SwapIndex) -> Result<()> {
        let block = self.blocks.get_mut(idx.index()).ok_or(VmError::InvalidSwapBlock(idx))?;
        if !block.used {
            return Ok(());
        }
        *block = SwapBlock::default();
        self.free_count += 1;
        Ok(())
    }

    /// Write one page of data into a used block
    pub fn write_to_swap(&mut self, idx: SwapIndex, data: &[u8]) -> Result<()> {
        self.check_used(idx)?;
        if data.len() != PAGE_SIZE {
            return Err(VmError::OutOfBounds { offset: 0, len: data.len() });
        }
        let start = idx.index() * PAGE_SIZE;
        self.area[start..start + PAGE_SIZE].copy_from_slice(data);
        self.disk_writes += 1;
        Ok(())
    }

    /// Read one page of data out of a used block
    pub fn read_from_swap(&mut self, idx: SwapIndex, buf: &mut [u8]) -> Result<()> {
        self.check_used(idx)?;
        if buf.len() != PAGE_SIZE {
            return Err(VmError::OutOfBounds { offset: 0, len: buf.len() });
        }
        let start = idx.index() * PAGE_SIZE;
        buf.copy_from_slice(&self.area[start..start + PAGE_SIZE]);
        self.disk_reads += 1;
        Ok(())
    }

    /// Locate the block holding `(pid, vpage)`
    pub fn find_block(&self, pid: Pid, vpage: u32) -> Option<SwapIndex> {
        self.blocks
            .iter()
            .position(|b| b.used && b.owner == Some(pid) && b.virtual_page == vpage)
            .map(|i| SwapIndex(i as u32))
    }

    /// Free every block owned by `pid`, returning how many were released
    pub fn release_owner(&mut self, pid: Pid) -> usize {
        self.release_where(|owner| owner == Some(pid))
    }

    /// Free every used block whose owner fails `keep`
    pub fn retain_owners<F: Fn(Pid) -> bool>(&mut self, keep: F) -> usize {
        self.release_where(|owner| owner.is_none_or(|pid| !keep(pid)))
    }

    fn release_where<F: Fn(Option<Pid>) -> bool>(&mut self, release: F) -> usize {
        let mut released = 0;
        for block in self.blocks.iter_mut().filter(|b| b.used) {
            if release(block.owner) {
                *block = SwapBlock::default();
                released += 1;
            }
        }
        self.free_count += released;
        released
    }
}

impl Default for SwapSpace {
    fn default() -> Self {
        Self::new(SWAP_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(byte: u8) -> Vec<u8> {
        vec![byte; PAGE_SIZE]
    }

    #[test]
    fn test_swap_initialization() {
        let swap = SwapSpace::new(16);
        assert_eq!(swap.num_blocks(), 16);
        assert_eq!(swap.free_blocks(), 16);
        assert_eq!(swap.area().len(), 16 * PAGE_SIZE);
        assert_eq!(SwapSpace::default().area().len(), SWAP_AREA_SIZE);
    }

    #[test]
    fn test_allocate_first_fit() {
        let mut swap = SwapSpace::new(4);
        assert_eq!(swap.allocate_swap_block(Pid(1), 10).unwrap(), SwapIndex(0));
        assert_eq!(swap.allocate_swap_block(Pid(1), 11).unwrap(), SwapIndex(1));
        swap.free_swap_block(SwapIndex(0)).unwrap();
        assert_eq!(swap.allocate_swap_block(Pid(2), 0).unwrap(), SwapIndex(0));

        let block = swap.block(SwapIndex(0)).unwrap();
        assert_eq!(block.owner, Some(Pid(2)));
        assert_eq!(block.virtual_page, 0);
    }

    #[test]
    fn test_allocate_exhaustion() {
        let mut swap = SwapSpace::new(1);
        swap.allocate_swap_block(Pid(1), 0).unwrap();
        assert_eq!(swap.allocate_swap_block(Pid(1), 1), Err(VmError::OutOfSwapSpace));
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut swap = SwapSpace::new(2);
        let idx = swap.allocate_swap_block(Pid(1), 0).unwrap();
        swap.free_swap_block(idx).unwrap();
        swap.free_swap_block(idx).unwrap();
        assert_eq!(swap.free_blocks(), 2);
        assert!(swap.free_swap_block(SwapIndex(9)).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let mut swap = SwapSpace::new(2);
        let idx = swap.allocate_swap_block(Pid(3), 5).unwrap();
        swap.write_to_swap(idx, &page_of(0xAB)).unwrap();
        assert_eq!(swap.disk_writes(), 1);

        let mut buf = vec![0u8; PAGE_SIZE];
        swap.read_from_swap(idx, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));
        assert_eq!(swap.disk_reads(), 1);
    }

    #[test]
    fn test_io_requires_used_block() {
        let mut swap = SwapSpace::new(2);
        assert_eq!(
            swap.write_to_swap(SwapIndex(0), &page_of(1)),
            Err(VmError::InvalidSwapBlock(SwapIndex(0)))
        );
        let idx = swap.allocate_swap_block(Pid(1), 0).unwrap();
        let mut short = [0u8; 16];
        assert!(swap.read_from_swap(idx, &mut short).is_err());
    }

    #[test]
    fn test_find_and_release_owner() {
        let mut swap = SwapSpace::new(4);
        swap.allocate_swap_block(Pid(1), 0).unwrap();
        swap.allocate_swap_block(Pid(2), 0).unwrap();
        swap.allocate_swap_block(Pid(1), 4).unwrap();

        assert_eq!(swap.find_block(Pid(1), 4), Some(SwapIndex(2)));
        assert_eq!(swap.find_block(Pid(2), 4), None);

        assert_eq!(swap.release_owner(Pid(1)), 2);
        assert_eq!(swap.free_blocks(), 3);
        assert_eq!(swap.find_block(Pid(1), 0), None);
    }

    #[test]
    fn test_retain_owners() {
        let mut swap = SwapSpace::new(4);
        swap.allocate_swap_block(Pid(1), 0).unwrap();
        swap.allocate_swap_block(Pid(2), 0).unwrap();
        swap.allocate_swap_block(Pid(3), 0).unwrap();

        let released = swap.retain_owners(|pid| pid == Pid(2));
        assert_eq!(released, 2);
        assert_eq!(swap.used_blocks(), 1);
        assert_eq!(swap.find_block(Pid(2), 0), Some(SwapIndex(1)));
    }
}
