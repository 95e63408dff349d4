//! Process control blocks and the process table that owns them.

use core::fmt;
use std::collections::BTreeMap;

use crate::constants::NUM_PRIORITIES;
use crate::error::{Result, VmError};
use crate::page_table::{PageTable, ProcessMemoryLayout};

/// Process identifier. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority; 0 is the highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const HIGH: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(1);
    pub const LOW: Priority = Priority(2);

    pub fn new(level: u8) -> Result<Self> {
        if (level as usize) < NUM_PRIORITIES {
            Ok(Priority(level))
        } else {
            Err(VmError::InvalidPriority(level))
        }
    }

    #[inline]
    pub fn level(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Lower level takes precedence
    #[inline]
    pub fn outranks(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = VmError;

    fn try_from(level: u8) -> Result<Self> {
        Priority::new(level)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    Terminated,
    Waiting,
}

impl ProcessState {
    pub fn name(self) -> &'static str {
        match self {
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Blocked => "blocked",
            ProcessState::Terminated => "terminated",
            ProcessState::Waiting => "waiting",
        }
    }
}

/// Per-process counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub memory_accesses: u64,
    pub page_faults: u64,
    pub swap_ins: u64,
    pub swap_outs: u64,
    pub cpu_ticks: u64,
    pub preemptions: u64,
    pub slice_expirations: u64,
    pub dispatches: u64,
}

/// Process Control Block
#[derive(Debug, Clone)]
pub struct ProcessControlBlock {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub priority: Priority,
    /// Ticks left in the current slice
    pub time_slice: u32,
    /// Full slice restored on expiry
    pub time_slice_total: u32,
    /// Set when the process last left the CPU through preemption
    pub preempted: bool,
    pub page_table: PageTable,
    pub layout: ProcessMemoryLayout,
    pub stats: ProcessStats,
}

impl ProcessControlBlock {
    pub fn new(
        pid: Pid,
        name: &str,
        priority: Priority,
        layout: ProcessMemoryLayout,
        time_slice: u32,
    ) -> Self {
        ProcessControlBlock {
            pid,
            name: name.to_string(),
            state: ProcessState::Ready,
            priority,
            time_slice,
            time_slice_total: time_slice,
            preempted: false,
            page_table: PageTable::setup_process_memory(&layout),
            layout,
            stats: ProcessStats::default(),
        }
    }

    pub fn total_pages(&self) -> usize {
        self.page_table.len()
    }

    pub fn present_pages(&self) -> usize {
        self.page_table.present_count()
    }

    pub fn resident_percent(&self) -> u32 {
        self.page_table.resident_percent()
    }

    pub fn reset_time_slice(&mut self) {
        self.time_slice = self.time_slice_total;
    }
}

/// Arena of live PCBs keyed by pid. The scheduler refers to entries by pid only.
#[derive(Debug, Default)]
pub struct ProcessTable {
    processes: BTreeMap<Pid, ProcessControlBlock>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pcb: ProcessControlBlock) {
        self.processes.insert(pcb.pid, pcb);
    }

    pub fn remove(&mut self, pid: Pid) -> Option<ProcessControlBlock> {
        self.processes.remove(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessControlBlock> {
        self.processes.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut ProcessControlBlock> {
        self.processes.get_mut(&pid)
    }

    pub fn require(&self, pid: Pid) -> Result<&ProcessControlBlock> {
        self.get(pid).ok_or(VmError::InvalidProcess(pid))
    }

    pub fn require_mut(&mut self, pid: Pid) -> Result<&mut ProcessControlBlock> {
        self.get_mut(pid).ok_or(VmError::InvalidProcess(pid))
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.processes.keys().copied().collect()
    }

    /// PCBs in pid order
    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.processes.values()
    }

    /// Processes that still hold resources
    pub fn live(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.processes.values().filter(|p| p.state != ProcessState::Terminated)
    }
}
