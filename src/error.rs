use core::fmt;

use crate::memory::FrameId;
use crate::process::Pid;
use crate::swap::SwapIndex;

/// Errors reported by the memory and scheduling subsystems.
///
/// Every failure is recovered at the call site that detects it; nothing is
/// retried internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// No free frame and the replacement engine found no victim
    OutOfPhysicalMemory,
    /// Every swap block is in use
    OutOfSwapSpace,
    InvalidPage { pid: Pid, page: u32 },
    InvalidFrame(FrameId),
    InvalidSwapBlock(SwapIndex),
    InvalidProcess(Pid),
    InvalidAddress { pid: Pid, vaddr: u32 },
    InvalidPriority(u8),
    /// Byte range does not fit inside one page
    OutOfBounds { offset: usize, len: usize },
    LayoutTooLarge { pages: usize, max: usize },
    ProcessLimit(usize),
    /// Detected by a consistency check; never corrected automatically
    InconsistentState(String),
    InvalidConfig(String),
    Snapshot(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::OutOfPhysicalMemory => write!(f, "out of physical memory"),
            VmError::OutOfSwapSpace => write!(f, "out of swap space"),
            VmError::InvalidPage { pid, page } => {
                write!(f, "invalid page {} for process {}", page, pid)
            }
            VmError::InvalidFrame(frame) => write!(f, "invalid frame {}", frame),
            VmError::InvalidSwapBlock(idx) => write!(f, "invalid swap block {}", idx),
            VmError::InvalidProcess(pid) => write!(f, "no such process {}", pid),
            VmError::InvalidAddress { pid, vaddr } => {
                write!(f, "address {:#x} outside process {}", vaddr, pid)
            }
            VmError::InvalidPriority(p) => write!(f, "invalid priority {}", p),
            VmError::OutOfBounds { offset, len } => {
                write!(f, "range {}+{} crosses the page boundary", offset, len)
            }
            VmError::LayoutTooLarge { pages, max } => {
                write!(f, "layout needs {} pages, limit is {}", pages, max)
            }
            VmError::ProcessLimit(max) => write!(f, "process limit of {} reached", max),
            VmError::InconsistentState(msg) => write!(f, "inconsistent state: {}", msg),
            VmError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            VmError::Snapshot(msg) => write!(f, "snapshot error: {}", msg),
        }
    }
}

impl std::error::Error for VmError {}

pub type Result<T> = core::result::Result<T, VmError>;
