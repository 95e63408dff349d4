//! Priority-preemptive scheduler with time slicing.
//!
//! Ready processes wait in one FIFO queue per priority level (0 first). Queues
//! hold pids only; the PCBs live in the [`ProcessTable`].

use std::collections::VecDeque;

use crate::config::SystemConfig;
use crate::constants::{FIRST_PID, NUM_PRIORITIES};
use crate::error::{Result, VmError};
use crate::observer::Event;
use crate::process::{Pid, Priority, ProcessState, ProcessTable};
use crate::vm::VirtualMemoryManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub slice_expirations: u64,
}

pub struct ProcessScheduler {
    ready: [VecDeque<Pid>; NUM_PRIORITIES],
    blocked: VecDeque<Pid>,
    running: Option<Pid>,
    next_pid: u32,
    time_slice: u32,
    min_resident_percent: u32,
    victim_floor_percent: u32,
    stats: SchedulerStats,
}

impl ProcessScheduler {
    pub fn new(config: &SystemConfig) -> Self {
        ProcessScheduler {
            ready: Default::default(),
            blocked: VecDeque::new(),
            running: None,
            next_pid: FIRST_PID,
            time_slice: config.time_slice,
            min_resident_percent: config.min_resident_percent,
            victim_floor_percent: config.victim_floor_percent,
            stats: SchedulerStats::default(),
        }
    }

    /// Rebuild queue state saved from another scheduler
    pub fn restore(
        &mut self,
        ready: [VecDeque<Pid>; NUM_PRIORITIES],
        blocked: VecDeque<Pid>,
        running: Option<Pid>,
        next_pid: u32,
        stats: SchedulerStats,
    ) {
        self.ready = ready;
        self.blocked = blocked;
        self.running = running;
        self.next_pid = next_pid.max(FIRST_PID);
        self.stats = stats;
    }

    /// Issue the next pid
    pub fn allocate_pid(&mut self) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        pid
    }

    pub fn next_pid(&self) -> u32 {
        self.next_pid
    }

    pub fn time_slice(&self) -> u32 {
        self.time_slice
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn running(&self) -> Option<Pid> {
        self.running
    }

    pub fn ready_queue(&self, priority: Priority) -> &VecDeque<Pid> {
        &self.ready[priority.index()]
    }

    pub fn blocked_queue(&self) -> &VecDeque<Pid> {
        &self.blocked
    }

    /// A candidate preempts the running process only with strictly higher precedence
    pub fn should_preempt(current: Priority, candidate: Priority) -> bool {
        candidate.outranks(current)
    }

    /// Mark `pid` Ready and append it to its priority queue
    pub fn enqueue(&mut self, processes: &mut ProcessTable, pid: Pid) -> Result<()> {
        let pcb = processes.require_mut(pid)?;
        pcb.state = ProcessState::Ready;
        let queue = &mut self.ready[pcb.priority.index()];
        if !queue.contains(&pid) {
            queue.push_back(pid);
        }
        Ok(())
    }

    /// Drop `pid` from every queue and the running slot
    pub fn remove(&mut self, pid: Pid) -> bool {
        let mut found = false;
        for queue in self.ready.iter_mut().chain(std::iter::once(&mut self.blocked)) {
            let before = queue.len();
            queue.retain(|&p| p != pid);
            found |= queue.len() != before;
        }
        if self.running == Some(pid) {
            self.running = None;
            found = true;
        }
        found
    }

    /// Pick work for the CPU.
    ///
    /// When idle, the head of the highest non-empty queue runs. Otherwise only
    /// a strictly higher priority queue can take the CPU, by preemption.
    pub fn schedule(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
    ) -> Result<Option<Pid>> {
        let Some(current) = self.running else {
            let next = self.ready.iter().find_map(|queue| queue.front().copied());
            if let Some(pid) = next {
                self.dispatch_queued(processes, vm, pid)?;
            }
            return Ok(next);
        };

        let current_priority = processes.require(current)?.priority;
        let candidate = self.ready[..current_priority.index()]
            .iter()
            .find_map(|queue| queue.front().copied());
        match candidate {
            Some(candidate) => {
                self.preempt_process(processes, vm, current, candidate)?;
                Ok(Some(candidate))
            }
            None => Ok(Some(current)),
        }
    }

    /// Return `current` to its ready queue and give the CPU to `candidate`
    pub fn preempt_process(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
        current: Pid,
        candidate: Pid,
    ) -> Result<()> {
        if self.running != Some(current) {
            return Err(VmError::InvalidProcess(current));
        }
        processes.require(candidate)?;

        let pcb = processes.require_mut(current)?;
        pcb.preempted = true;
        pcb.stats.preemptions += 1;
        self.stats.preemptions += 1;
        self.running = None;
        self.enqueue(processes, current)?;

        vm.record(Event::Preempted { pid: current, by: candidate });
        self.dispatch_queued(processes, vm, candidate)
    }

    /// Install `pid` as the running process, demoting whatever ran before
    pub fn set_running_process(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
        pid: Pid,
    ) -> Result<()> {
        match processes.require(pid)?.state {
            ProcessState::Terminated | ProcessState::Blocked => {
                return Err(VmError::InvalidProcess(pid));
            }
            _ => {}
        }
        if self.running == Some(pid) {
            return Ok(());
        }

        if let Some(current) = self.running.take() {
            self.enqueue(processes, current)?;
        }
        self.dispatch_queued(processes, vm, pid)
    }

    // Take `pid` off its ready queue and dispatch it. On failure it goes back
    // where it was.
    fn dispatch_queued(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
        pid: Pid,
    ) -> Result<()> {
        let slot = self.ready.iter().enumerate().find_map(|(level, queue)| {
            queue.iter().position(|&p| p == pid).map(|pos| (level, pos))
        });
        self.remove(pid);
        if let Err(error) = self.dispatch(processes, vm, pid) {
            if let Some((level, pos)) = slot {
                self.ready[level].insert(pos, pid);
            }
            return Err(error);
        }
        Ok(())
    }

    // Top the process up to the resident floor before it gets the CPU
    fn dispatch(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
        pid: Pid,
    ) -> Result<()> {
        let (min, floor) = (self.min_resident_percent, self.victim_floor_percent);
        let paged_in = vm.ensure_resident(processes, pid, min, floor)?;

        let pcb = processes.require_mut(pid)?;
        pcb.state = ProcessState::Running;
        pcb.stats.dispatches += 1;
        self.running = Some(pid);
        self.stats.context_switches += 1;
        vm.record(Event::Dispatched { pid, paged_in });
        Ok(())
    }

    /// Advance one tick of the running process's slice, rotating it out when the
    /// slice runs out. Returns the process running afterwards.
    pub fn time_tick(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
    ) -> Result<Option<Pid>> {
        self.stats.ticks += 1;
        vm.record(Event::Tick { running: self.running });

        let Some(pid) = self.running else {
            return Ok(None);
        };

        let pcb = processes.require_mut(pid)?;
        pcb.stats.cpu_ticks += 1;
        pcb.time_slice = pcb.time_slice.saturating_sub(1);
        if pcb.time_slice > 0 {
            return Ok(Some(pid));
        }

        pcb.reset_time_slice();
        pcb.stats.slice_expirations += 1;
        self.stats.slice_expirations += 1;
        self.running = None;
        self.enqueue(processes, pid)?;
        vm.record(Event::SliceExpired { pid });

        self.schedule(processes, vm)
    }

    /// Move `pid` to the blocked queue, freeing the CPU if it was running
    pub fn block_process(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
        pid: Pid,
    ) -> Result<()> {
        let pcb = processes.require_mut(pid)?;
        if matches!(pcb.state, ProcessState::Blocked | ProcessState::Terminated) {
            return Ok(());
        }
        pcb.state = ProcessState::Blocked;

        let was_running = self.running == Some(pid);
        self.remove(pid);
        self.blocked.push_back(pid);
        vm.record(Event::Blocked { pid });

        if was_running {
            self.schedule(processes, vm)?;
        }
        Ok(())
    }

    /// Return a blocked process to its ready queue
    pub fn unblock_process(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
        pid: Pid,
    ) -> Result<()> {
        if processes.require(pid)?.state != ProcessState::Blocked {
            return Ok(());
        }
        self.blocked.retain(|&p| p != pid);
        self.enqueue(processes, pid)?;
        vm.record(Event::Unblocked { pid });

        if self.running.is_some() {
            self.schedule(processes, vm)?;
        }
        Ok(())
    }

    /// Change a process's priority, requeueing it and re-checking preemption
    pub fn set_priority(
        &mut self,
        processes: &mut ProcessTable,
        vm: &mut VirtualMemoryManager,
        pid: Pid,
        priority: Priority,
    ) -> Result<()> {
        let pcb = processes.require_mut(pid)?;
        let old = pcb.priority;
        pcb.priority = priority;
        if pcb.state == ProcessState::Ready && old != priority {
            self.ready[old.index()].retain(|&p| p != pid);
            self.ready[priority.index()].push_back(pid);
        }
        vm.record(Event::PriorityChanged { pid, priority });

        if self.running.is_some() {
            self.schedule(processes, vm)?;
        }
        Ok(())
    }

    /// Every live process sits in exactly the place its state says
    pub fn check_placement(&self, processes: &ProcessTable) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(VmError::InconsistentState(msg)) };

        for pcb in processes.live() {
            let pid = pcb.pid;
            let in_ready: Vec<usize> = (0..NUM_PRIORITIES)
                .map(|level| self.ready[level].iter().filter(|&&p| p == pid).count())
                .collect();
            let ready_total: usize = in_ready.iter().sum();
            let blocked = self.blocked.iter().filter(|&&p| p == pid).count();
            let running = usize::from(self.running == Some(pid));

            if ready_total + blocked + running != 1 {
                return fail(format!(
                    "pid {} appears {} times across ready, blocked and running",
                    pid,
                    ready_total + blocked + running
                ));
            }
            let placed_right = match pcb.state {
                ProcessState::Ready => in_ready[pcb.priority.index()] == 1,
                ProcessState::Running => running == 1,
                ProcessState::Blocked => blocked == 1,
                ProcessState::Waiting | ProcessState::Terminated => false,
            };
            if !placed_right {
                return fail(format!("pid {} is {} but queued elsewhere", pid, pcb.state.name()));
            }
        }

        let queued =
            self.ready.iter().flatten().chain(self.blocked.iter()).chain(self.running.iter());
        for pid in queued {
            if !processes.contains(*pid) {
                return fail(format!("queue holds unknown pid {}", pid));
            }
        }
        Ok(())
    }
}
