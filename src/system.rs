//! The simulation context.
//!
//! [`SystemContext`] owns the frame table, swap area, process table and
//! scheduler of one simulation. Every operation takes it by reference, so
//! independent simulations can coexist and tests stay deterministic.

use std::collections::VecDeque;
use std::fmt;

use crate::config::SystemConfig;
use crate::error::{Result, VmError};
use crate::memory::{Frame, FrameBitmap, FrameId};
use crate::observer::{Event, LogObserver, Observer};
use crate::page_table::ProcessMemoryLayout;
use crate::process::{Pid, Priority, ProcessControlBlock, ProcessState, ProcessTable};
use crate::scheduler::ProcessScheduler;
use crate::swap::{SwapBlock, SwapIndex};
use crate::vm::{AccessOutcome, MemoryStats, VirtualMemoryManager};

pub struct SystemContext {
    config: SystemConfig,
    vm: VirtualMemoryManager,
    processes: ProcessTable,
    scheduler: ProcessScheduler,
    observer: Box<dyn Observer>,
}

impl fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemContext")
            .field("config", &self.config)
            .field("processes", &self.processes)
            .field("running", &self.scheduler.running())
            .field("memory", &self.vm.memory_stats())
            .finish_non_exhaustive()
    }
}

impl SystemContext {
    /// Initialise memory, swap and scheduler for `config`
    pub fn new(config: SystemConfig) -> Result<Self> {
        config.validate()?;
        Ok(SystemContext {
            vm: VirtualMemoryManager::new(config.physical_pages, config.swap_size),
            processes: ProcessTable::new(),
            scheduler: ProcessScheduler::new(&config),
            observer: Box::new(LogObserver),
            config,
        })
    }

    /// Reassemble a context from restored parts, rejecting inconsistent state
    pub fn from_parts(
        config: SystemConfig,
        vm: VirtualMemoryManager,
        processes: ProcessTable,
        scheduler: ProcessScheduler,
    ) -> Result<Self> {
        config.validate()?;
        let observer = Box::new(LogObserver);
        let ctx = SystemContext { config, vm, processes, scheduler, observer };
        ctx.check_state()?;
        Ok(ctx)
    }

    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn set_observer(&mut self, observer: Box<dyn Observer>) {
        self.observer = observer;
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn vm(&self) -> &VirtualMemoryManager {
        &self.vm
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn scheduler(&self) -> &ProcessScheduler {
        &self.scheduler
    }

    // Run one public operation, then hand its events to the observer
    fn run<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = op(self);
        self.vm.dispatch_events(self.observer.as_mut());
        result
    }

    /// Tear down every process, leaving memory and swap empty
    pub fn shutdown(&mut self) -> Result<()> {
        for pid in self.processes.pids() {
            self.process_destroy(pid)?;
        }
        Ok(())
    }

    /// Tear everything down and start over with the same configuration
    pub fn reset(&mut self) -> Result<()> {
        self.shutdown()?;
        self.vm = VirtualMemoryManager::new(self.config.physical_pages, self.config.swap_size);
        self.processes = ProcessTable::new();
        self.scheduler = ProcessScheduler::new(&self.config);
        Ok(())
    }

    /// Create a process with the configured heap and stack sizes
    pub fn create_process(
        &mut self,
        name: &str,
        priority: Priority,
        code_pages: u32,
        data_pages: u32,
    ) -> Result<Pid> {
        let (heap_pages, stack_pages) = (self.config.heap_pages, self.config.stack_pages);
        let max = self.config.max_process_pages;
        let total =
            ProcessMemoryLayout::page_count(code_pages, data_pages, heap_pages, stack_pages);
        let pages = usize::try_from(total).unwrap_or(usize::MAX);
        let too_large = VmError::LayoutTooLarge { pages, max };
        if total > max as u64 {
            return Err(too_large);
        }
        let layout = ProcessMemoryLayout::new(code_pages, data_pages, heap_pages, stack_pages)
            .ok_or(too_large)?;
        self.create_process_with_layout(name, priority, layout)
    }

    /// Create a process, load every page of `layout` and queue it.
    ///
    /// If loading fails the partial process is torn down and the error returned.
    /// Pages evicted from other processes along the way stay evicted.
    pub fn create_process_with_layout(
        &mut self,
        name: &str,
        priority: Priority,
        layout: ProcessMemoryLayout,
    ) -> Result<Pid> {
        self.run(|ctx| {
            if ctx.processes.len() >= ctx.config.max_processes {
                return Err(VmError::ProcessLimit(ctx.config.max_processes));
            }
            let pages = layout.total_pages();
            if pages > ctx.config.max_process_pages {
                return Err(VmError::LayoutTooLarge { pages, max: ctx.config.max_process_pages });
            }

            let pid = ctx.scheduler.allocate_pid();
            let pcb = ProcessControlBlock::new(pid, name, priority, layout, ctx.config.time_slice);
            ctx.processes.insert(pcb);

            if let Err(error) = ctx.vm.load_process(&mut ctx.processes, pid) {
                if let Some(mut pcb) = ctx.processes.remove(pid) {
                    ctx.vm.release_process(&mut pcb)?;
                }
                ctx.vm.record(Event::CreationRolledBack { pid, error: error.clone() });
                return Err(error);
            }

            ctx.scheduler.enqueue(&mut ctx.processes, pid)?;
            ctx.vm.record(Event::ProcessCreated { pid, priority, pages });

            if ctx.scheduler.running().is_some() {
                ctx.scheduler.schedule(&mut ctx.processes, &mut ctx.vm)?;
            }
            Ok(pid)
        })
    }

    /// Terminate a process and release everything it holds.
    ///
    /// Returns `false` when the process is already gone.
    pub fn process_destroy(&mut self, pid: Pid) -> Result<bool> {
        self.run(|ctx| {
            let Some(mut pcb) = ctx.processes.remove(pid) else {
                return Ok(false);
            };
            let was_running = ctx.scheduler.running() == Some(pid);
            ctx.scheduler.remove(pid);

            let (frames_released, blocks_released) = ctx.vm.release_process(&mut pcb)?;
            pcb.state = ProcessState::Terminated;
            ctx.vm.record(Event::ProcessDestroyed { pid, frames_released, blocks_released });

            if was_running {
                ctx.scheduler.schedule(&mut ctx.processes, &mut ctx.vm)?;
            }
            Ok(true)
        })
    }

    pub fn schedule(&mut self) -> Result<Option<Pid>> {
        self.run(|ctx| ctx.scheduler.schedule(&mut ctx.processes, &mut ctx.vm))
    }

    pub fn time_tick(&mut self) -> Result<Option<Pid>> {
        self.run(|ctx| ctx.scheduler.time_tick(&mut ctx.processes, &mut ctx.vm))
    }

    /// Advance `n` ticks; returns the process running afterwards
    pub fn time_ticks(&mut self, n: u32) -> Result<Option<Pid>> {
        let mut running = self.scheduler.running();
        for _ in 0..n {
            running = self.time_tick()?;
        }
        Ok(running)
    }

    pub fn set_running_process(&mut self, pid: Pid) -> Result<()> {
        self.run(|ctx| ctx.scheduler.set_running_process(&mut ctx.processes, &mut ctx.vm, pid))
    }

    pub fn block_process(&mut self, pid: Pid) -> Result<()> {
        self.run(|ctx| ctx.scheduler.block_process(&mut ctx.processes, &mut ctx.vm, pid))
    }

    pub fn unblock_process(&mut self, pid: Pid) -> Result<()> {
        self.run(|ctx| ctx.scheduler.unblock_process(&mut ctx.processes, &mut ctx.vm, pid))
    }

    pub fn set_priority(&mut self, pid: Pid, priority: Priority) -> Result<()> {
        self.run(|ctx| ctx.scheduler.set_priority(&mut ctx.processes, &mut ctx.vm, pid, priority))
    }

    pub fn access_memory(&mut self, pid: Pid, vaddr: u32, is_write: bool) -> Result<AccessOutcome> {
        self.run(|ctx| ctx.vm.access_memory(&mut ctx.processes, pid, vaddr, is_write))
    }

    pub fn read_memory(&mut self, pid: Pid, vaddr: u32, len: usize) -> Result<Vec<u8>> {
        self.run(|ctx| ctx.vm.read_memory(&mut ctx.processes, pid, vaddr, len))
    }

    pub fn write_memory(&mut self, pid: Pid, vaddr: u32, data: &[u8]) -> Result<()> {
        self.run(|ctx| ctx.vm.write_memory(&mut ctx.processes, pid, vaddr, data))
    }

    pub fn page_in(&mut self, pid: Pid, vpage: u32) -> Result<FrameId> {
        self.run(|ctx| ctx.vm.page_in(&mut ctx.processes, pid, vpage))
    }

    pub fn page_out(&mut self, pid: Pid, vpage: u32) -> Result<SwapIndex> {
        self.run(|ctx| ctx.vm.page_out(&mut ctx.processes, pid, vpage))
    }

    /// Free swap blocks left behind by processes that no longer exist
    pub fn swap_clean(&mut self) -> usize {
        self.vm.swap_clean(&self.processes)
    }

    /// Verify every cross-structure invariant; reports the first violation
    pub fn check_state(&self) -> Result<()> {
        self.vm.check_state(&self.processes)?;
        self.scheduler.check_placement(&self.processes)
    }

    pub fn get_physical_memory(&self) -> &[u8] {
        self.vm.frames().physical_memory()
    }

    pub fn get_frame_map(&self) -> &FrameBitmap {
        self.vm.frames().bitmap()
    }

    pub fn get_frames(&self) -> &[Frame] {
        self.vm.frames().frames()
    }

    pub fn get_swap_blocks(&self) -> &[SwapBlock] {
        self.vm.swap().blocks()
    }

    pub fn get_swap_area(&self) -> &[u8] {
        self.vm.swap().area()
    }

    pub fn get_memory_stats(&self) -> MemoryStats {
        self.vm.memory_stats()
    }

    pub fn get_ready_queue(&self, priority: Priority) -> &VecDeque<Pid> {
        self.scheduler.ready_queue(priority)
    }

    pub fn get_running_process(&self) -> Option<&ProcessControlBlock> {
        self.scheduler.running().and_then(|pid| self.processes.get(pid))
    }

    pub fn get_total_processes(&self) -> usize {
        self.processes.len()
    }

    pub fn get_process_by_pid(&self, pid: Pid) -> Option<&ProcessControlBlock> {
        self.processes.get(pid)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::constants::{DEFAULT_HEAP_PAGES, DEFAULT_STACK_PAGES, PAGE_SIZE};

    fn context(physical_pages: usize, swap_size: usize) -> SystemContext {
        let config =
            SystemConfig { physical_pages, swap_size, time_slice: 4, ..SystemConfig::default() }
                .without_default_segments();
        SystemContext::new(config).unwrap()
    }

    fn pages(code: u32) -> ProcessMemoryLayout {
        ProcessMemoryLayout::new(code, 0, 0, 0).unwrap()
    }

    #[derive(Clone, Default)]
    struct SharedRecorder(Rc<RefCell<Vec<Event>>>);

    impl Observer for SharedRecorder {
        fn on_event(&mut self, event: &Event) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SystemConfig { physical_pages: 0, ..SystemConfig::default() };
        assert!(SystemContext::new(config).is_err());
    }

    #[test]
    fn test_create_places_in_ready_queue_once() {
        let mut ctx = context(32, 32);
        for level in 0..3 {
            let priority = Priority::new(level).unwrap();
            let pid = ctx.create_process("p", priority, 2, 1).unwrap();

            for other in 0..3 {
                let queue = ctx.get_ready_queue(Priority::new(other).unwrap());
                let hits = queue.iter().filter(|&&p| p == pid).count();
                assert_eq!(hits, usize::from(other == level));
            }
            assert_eq!(ctx.get_process_by_pid(pid).unwrap().state, ProcessState::Ready);
        }
        assert_eq!(ctx.get_total_processes(), 3);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_create_uses_configured_segments() {
        let config = SystemConfig { heap_pages: 2, stack_pages: 1, ..SystemConfig::default() };
        let mut ctx = SystemContext::new(config).unwrap();
        let pid = ctx.create_process("p", Priority::NORMAL, 3, 2).unwrap();
        let pcb = ctx.get_process_by_pid(pid).unwrap();
        assert_eq!(pcb.total_pages(), 8);
        assert_eq!(pcb.layout.stack.start_page, 7);
        assert_eq!(pcb.present_pages(), 8);
    }

    #[test]
    fn test_creation_preempts_lower_priority() {
        let mut ctx = context(32, 32);
        let low = ctx.create_process("low", Priority::LOW, 2, 0).unwrap();
        assert_eq!(ctx.schedule().unwrap(), Some(low));

        let high = ctx.create_process("high", Priority::HIGH, 2, 0).unwrap();
        assert_eq!(ctx.get_running_process().unwrap().pid, high);
        assert_eq!(ctx.get_ready_queue(Priority::LOW), &VecDeque::from([low]));
        assert_eq!(ctx.get_process_by_pid(low).unwrap().state, ProcessState::Ready);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_thrashing_under_pressure() {
        let mut ctx = context(256, 1024);
        let a = ctx.create_process_with_layout("A", Priority::NORMAL, pages(200)).unwrap();
        let swap_before = ctx.get_memory_stats().swap_free_blocks;

        let b = ctx.create_process_with_layout("B", Priority::NORMAL, pages(100)).unwrap();

        let pcb_a = ctx.get_process_by_pid(a).unwrap();
        let evicted = pcb_a.page_table.swapped_count();
        assert_eq!(evicted, 44);
        assert_eq!(pcb_a.present_pages(), 156);
        assert!(pcb_a
            .page_table
            .entries()
            .iter()
            .all(|pte| pte.is_present() != pte.is_swapped()));

        assert_eq!(ctx.get_process_by_pid(b).unwrap().present_pages(), 100);
        let stats = ctx.get_memory_stats();
        assert_eq!(stats.swap_free_blocks, swap_before - evicted);
        assert_eq!(stats.free_frames, 0);
        assert_eq!(stats.page_replacements, evicted as u64);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_time_slice_rotation_lone_process() {
        let mut ctx = context(16, 16);
        let pid = ctx.create_process("solo", Priority::NORMAL, 2, 0).unwrap();
        ctx.schedule().unwrap();

        for _ in 0..3 {
            assert_eq!(ctx.time_tick().unwrap(), Some(pid));
        }
        assert_eq!(ctx.get_running_process().unwrap().time_slice, 1);

        assert_eq!(ctx.time_tick().unwrap(), Some(pid));
        let pcb = ctx.get_running_process().unwrap();
        assert_eq!(pcb.pid, pid);
        assert_eq!(pcb.state, ProcessState::Running);
        assert_eq!(pcb.time_slice, 4);
        assert_eq!(pcb.stats.slice_expirations, 1);
        assert_eq!(pcb.stats.dispatches, 2);
        assert!(ctx.get_ready_queue(Priority::NORMAL).is_empty());
    }

    #[test]
    fn test_page_round_trip_through_swap() {
        let mut ctx = context(8, 8);
        let pid = ctx.create_process("p", Priority::NORMAL, 3, 0).unwrap();
        let vaddr = 2 * PAGE_SIZE as u32 + 17;
        ctx.write_memory(pid, vaddr, b"persist me").unwrap();

        ctx.page_out(pid, 2).unwrap();
        assert!(ctx.get_process_by_pid(pid).unwrap().page_table.get(2).unwrap().is_swapped());
        assert!(ctx.check_state().is_ok());

        ctx.page_in(pid, 2).unwrap();
        assert_eq!(ctx.read_memory(pid, vaddr, 10).unwrap(), b"persist me");
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_destroy_releases_and_is_idempotent() {
        let mut ctx = context(4, 8);
        let a = ctx.create_process_with_layout("a", Priority::NORMAL, pages(3)).unwrap();
        let b = ctx.create_process_with_layout("b", Priority::NORMAL, pages(3)).unwrap();
        ctx.schedule().unwrap();

        assert!(ctx.process_destroy(a).unwrap());
        let stats = ctx.get_memory_stats();
        assert_eq!(stats.free_frames + ctx.get_process_by_pid(b).unwrap().present_pages(), 4);
        let b_swapped = ctx.get_process_by_pid(b).unwrap().page_table.swapped_count();
        assert_eq!(stats.swap_free_blocks + b_swapped, 8);
        assert_eq!(ctx.get_running_process().unwrap().pid, b);

        assert!(!ctx.process_destroy(a).unwrap());
        assert_eq!(ctx.get_total_processes(), 1);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_failed_creation_rolls_back() {
        let mut ctx = context(4, 2);
        let a = ctx.create_process_with_layout("a", Priority::NORMAL, pages(4)).unwrap();

        let err = ctx.create_process_with_layout("b", Priority::NORMAL, pages(8)).unwrap_err();
        assert_eq!(err, VmError::OutOfSwapSpace);
        assert_eq!(ctx.get_total_processes(), 1);

        // a's evicted pages stay in swap; b's frames were handed back
        let pcb = ctx.get_process_by_pid(a).unwrap();
        assert_eq!(pcb.page_table.swapped_count(), 2);
        assert_eq!(ctx.get_memory_stats().free_frames, 2);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_layout_limits() {
        let config =
            SystemConfig { max_process_pages: 4, max_processes: 1, ..SystemConfig::default() }
                .without_default_segments();
        let mut ctx = SystemContext::new(config).unwrap();
        assert_eq!(
            ctx.create_process("big", Priority::NORMAL, 5, 0),
            Err(VmError::LayoutTooLarge { pages: 5, max: 4 })
        );
        ctx.create_process("ok", Priority::NORMAL, 4, 0).unwrap();
        assert_eq!(
            ctx.create_process("more", Priority::NORMAL, 1, 0),
            Err(VmError::ProcessLimit(1))
        );
    }

    #[test]
    fn test_oversized_segments_are_rejected() {
        let mut ctx = SystemContext::new(SystemConfig::default()).unwrap();
        let max = ctx.config().max_process_pages;
        let total =
            u32::MAX as usize + 1 + DEFAULT_HEAP_PAGES as usize + DEFAULT_STACK_PAGES as usize;
        assert_eq!(
            ctx.create_process("big", Priority::NORMAL, u32::MAX, 1),
            Err(VmError::LayoutTooLarge { pages: total, max })
        );
        assert_eq!(ctx.get_total_processes(), 0);
        assert_eq!(ctx.scheduler().next_pid(), 1);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_set_running_tops_up_resident_pages() {
        let mut ctx = context(8, 16);
        let a = ctx.create_process_with_layout("a", Priority::NORMAL, pages(4)).unwrap();
        let b = ctx.create_process_with_layout("b", Priority::NORMAL, pages(4)).unwrap();
        for page in 0..4 {
            ctx.page_out(b, page).unwrap();
        }
        let c = ctx.create_process_with_layout("c", Priority::NORMAL, pages(4)).unwrap();
        assert_eq!(ctx.get_memory_stats().free_frames, 0);

        ctx.set_running_process(b).unwrap();
        assert_eq!(ctx.get_running_process().unwrap().pid, b);
        assert_eq!(ctx.get_process_by_pid(b).unwrap().present_pages(), 1);
        assert_eq!(ctx.get_process_by_pid(a).unwrap().present_pages(), 3);
        assert_eq!(ctx.get_process_by_pid(c).unwrap().present_pages(), 4);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_invariants_hold_across_mixed_workload() {
        let mut ctx = context(6, 32);
        let a = ctx.create_process_with_layout("a", Priority::HIGH, pages(4)).unwrap();
        let b = ctx.create_process_with_layout("b", Priority::LOW, pages(4)).unwrap();
        ctx.schedule().unwrap();

        for i in 0..16u32 {
            let pid = if i % 2 == 0 { a } else { b };
            let vaddr = (i % 4) * PAGE_SIZE as u32 + i;
            ctx.access_memory(pid, vaddr, i % 3 == 0).unwrap();
            ctx.time_tick().unwrap();
            ctx.check_state().unwrap();

            let map = ctx.get_frame_map();
            for (idx, frame) in ctx.get_frames().iter().enumerate() {
                assert_eq!(map.get(idx), frame.allocated);
            }
            let allocated = ctx.get_frames().iter().filter(|f| f.allocated).count();
            assert_eq!(ctx.get_memory_stats().free_frames + allocated, 6);
        }
        assert_eq!(ctx.get_memory_stats().total_accesses, 16);
    }

    #[test]
    fn test_block_unblock_and_priority_change() {
        let mut ctx = context(16, 16);
        let a = ctx.create_process("a", Priority::NORMAL, 1, 0).unwrap();
        let b = ctx.create_process("b", Priority::LOW, 1, 0).unwrap();
        ctx.schedule().unwrap();

        ctx.block_process(a).unwrap();
        assert_eq!(ctx.get_running_process().unwrap().pid, b);
        ctx.unblock_process(a).unwrap();
        assert_eq!(ctx.get_running_process().unwrap().pid, a);

        ctx.set_priority(b, Priority::HIGH).unwrap();
        assert_eq!(ctx.get_running_process().unwrap().pid, b);
        assert!(ctx.check_state().is_ok());
    }

    #[test]
    fn test_debug_summarises_context() {
        let mut ctx = context(4, 8);
        let a = ctx.create_process_with_layout("a", Priority::NORMAL, pages(2)).unwrap();
        ctx.schedule().unwrap();

        let text = format!("{:?}", ctx);
        assert!(text.starts_with("SystemContext {"));
        assert!(text.contains(&format!("running: Some({:?})", a)));
        assert!(text.contains("free_frames: 2"));
        assert!(text.ends_with(".. }"));
    }

    #[test]
    fn test_shutdown_frees_everything() {
        let mut ctx = context(4, 8);
        ctx.create_process_with_layout("a", Priority::NORMAL, pages(3)).unwrap();
        ctx.create_process_with_layout("b", Priority::HIGH, pages(3)).unwrap();
        ctx.schedule().unwrap();

        ctx.shutdown().unwrap();
        let stats = ctx.get_memory_stats();
        assert_eq!(stats.free_frames, 4);
        assert_eq!(stats.swap_free_blocks, 8);
        assert!(ctx.get_running_process().is_none());
        assert_eq!(ctx.get_total_processes(), 0);
        assert_eq!(ctx.swap_clean(), 0);
    }

    #[test]
    fn test_reset_restarts_pids_and_counters() {
        let mut ctx = context(4, 4);
        let pid = ctx.create_process_with_layout("p", Priority::NORMAL, pages(2)).unwrap();
        ctx.access_memory(pid, 0, true).unwrap();

        ctx.reset().unwrap();
        assert_eq!(
            ctx.get_memory_stats(),
            MemoryStats {
                total_frames: 4,
                free_frames: 4,
                swap_blocks: 4,
                swap_free_blocks: 4,
                ..MemoryStats::default()
            }
        );
        assert!(ctx.get_physical_memory().iter().all(|&b| b == 0));
        let pid = ctx.create_process_with_layout("q", Priority::NORMAL, pages(1)).unwrap();
        assert_eq!(pid, Pid(1));
    }

    #[test]
    fn test_observer_receives_events() {
        let recorder = SharedRecorder::default();
        let mut ctx = context(4, 4).with_observer(Box::new(recorder.clone()));

        let pid = ctx.create_process_with_layout("p", Priority::NORMAL, pages(1)).unwrap();
        ctx.process_destroy(pid).unwrap();

        let events = recorder.0.borrow();
        assert_eq!(events[0], Event::PageFault { pid, page: 0 });
        let created = Event::ProcessCreated { pid, priority: Priority::NORMAL, pages: 1 };
        assert!(events.contains(&created));
        assert_eq!(
            events.last(),
            Some(&Event::ProcessDestroyed { pid, frames_released: 1, blocks_released: 0 })
        );
    }
}
