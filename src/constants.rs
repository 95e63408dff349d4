pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const OFFSET_MASK: u32 = (1 << PAGE_SHIFT) - 1;

pub const PHYSICAL_PAGES: usize = 256;
pub const PM_SIZE: usize = PHYSICAL_PAGES * PAGE_SIZE;

pub const SWAP_SIZE: usize = 1024;
pub const SWAP_AREA_SIZE: usize = SWAP_SIZE * PAGE_SIZE;

// upper bound on a single process's virtual pages
pub const MAX_PROCESS_PAGES: usize = 1024;
pub const MAX_PROCESSES: usize = 64;

pub const NUM_PRIORITIES: usize = 3;
pub const DEFAULT_TIME_SLICE: u32 = 5;

pub const MIN_RESIDENT_PERCENT: u32 = 25;
pub const VICTIM_FLOOR_PERCENT: u32 = 15;

pub const DEFAULT_HEAP_PAGES: u32 = 4;
pub const DEFAULT_STACK_PAGES: u32 = 4;

pub const FIRST_PID: u32 = 1;
