//! Versioned binary snapshot of a whole simulation.
//!
//! Layout: the magic `VMSS`, a `u32` version, then every field in a fixed order,
//! little-endian. Lengths and counts are `u64`, optional ids are a presence
//! byte followed by a `u32`. A restored context must pass the same
//! consistency check as a live one.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::config::SystemConfig;
use crate::constants::NUM_PRIORITIES;
use crate::error::{Result, VmError};
use crate::memory::{Frame, FrameBitmap, FrameId, PhysicalFrameTable};
use crate::page_table::{PageTable, PageTableEntry, ProcessMemoryLayout, PteFlags};
use crate::process::{Pid, Priority, ProcessControlBlock, ProcessState, ProcessStats, ProcessTable};
use crate::scheduler::{ProcessScheduler, SchedulerStats};
use crate::swap::{SwapBlock, SwapIndex, SwapSpace};
use crate::system::SystemContext;
use crate::vm::{VirtualMemoryManager, VmCounters};

pub const MAGIC: &[u8; 4] = b"VMSS";
pub const VERSION: u32 = 1;

const PRIORITIES: [Priority; NUM_PRIORITIES] = [Priority::HIGH, Priority::NORMAL, Priority::LOW];

fn corrupt(msg: impl Into<String>) -> VmError {
    VmError::Snapshot(msg.into())
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn len(&mut self, n: usize) {
        self.u64(n as u64);
    }

    fn opt_u32(&mut self, v: Option<u32>) {
        match v {
            Some(v) => {
                self.u8(1);
                self.u32(v);
            }
            None => self.u8(0),
        }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.len(data.len());
        self.buf.extend_from_slice(data);
    }

    fn pids(&mut self, pids: &VecDeque<Pid>) {
        self.len(pids.len());
        for pid in pids {
            self.u32(pid.0);
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(corrupt(format!("truncated at byte {}", self.pos)));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(corrupt(format!("bad flag byte {} at {}", other, self.pos - 1))),
        }
    }

    fn u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// A count of items at least `min_item` bytes each; bounded by what is left
    fn len(&mut self, min_item: usize) -> Result<usize> {
        let n = self.u64()?;
        let left = (self.buf.len() - self.pos) as u64;
        if n.saturating_mul(min_item.max(1) as u64) > left {
            return Err(corrupt(format!("count {} exceeds remaining {} bytes", n, left)));
        }
        Ok(n as usize)
    }

    fn size(&mut self) -> Result<usize> {
        let n = self.u64()?;
        usize::try_from(n).map_err(|_| corrupt(format!("size {} does not fit in memory", n)))
    }

    fn opt_u32(&mut self) -> Result<Option<u32>> {
        if self.bool()? { Ok(Some(self.u32()?)) } else { Ok(None) }
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let n = self.len(1)?;
        Ok(self.take(n)?.to_vec())
    }

    fn pids(&mut self) -> Result<VecDeque<Pid>> {
        let n = self.len(4)?;
        (0..n).map(|_| self.u32().map(Pid)).collect()
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(corrupt(format!("{} trailing bytes", self.buf.len() - self.pos)));
        }
        Ok(())
    }
}

fn state_code(state: ProcessState) -> u8 {
    match state {
        ProcessState::Ready => 0,
        ProcessState::Running => 1,
        ProcessState::Blocked => 2,
        ProcessState::Terminated => 3,
        ProcessState::Waiting => 4,
    }
}

fn state_from_code(code: u8) -> Result<ProcessState> {
    Ok(match code {
        0 => ProcessState::Ready,
        1 => ProcessState::Running,
        2 => ProcessState::Blocked,
        3 => ProcessState::Terminated,
        4 => ProcessState::Waiting,
        other => return Err(corrupt(format!("unknown process state {}", other))),
    })
}

/// Serialize the whole simulation
pub fn save(ctx: &SystemContext) -> Vec<u8> {
    let mut w = Writer { buf: Vec::new() };
    w.buf.extend_from_slice(MAGIC);
    w.u32(VERSION);

    let config = ctx.config();
    w.len(config.physical_pages);
    w.len(config.swap_size);
    w.len(config.max_process_pages);
    w.len(config.max_processes);
    w.u32(config.time_slice);
    w.u32(config.min_resident_percent);
    w.u32(config.victim_floor_percent);
    w.u32(config.heap_pages);
    w.u32(config.stack_pages);

    let vm = ctx.vm();
    let counters = vm.counters();
    w.u64(counters.total_accesses);
    w.u64(counters.page_faults);
    w.u64(counters.page_replacements);
    w.u64(counters.swap_ins);
    w.u64(counters.swap_outs);

    let frames = vm.frames();
    w.u64(frames.clock());
    w.len(frames.num_frames());
    for frame in frames.frames() {
        w.bool(frame.allocated);
        w.opt_u32(frame.owner.map(|pid| pid.0));
        w.u32(frame.virtual_page);
        w.bool(frame.dirty);
        w.u64(frame.last_access);
    }
    w.len(frames.bitmap().words().len());
    for word in frames.bitmap().words() {
        w.u64(*word);
    }
    w.bytes(frames.physical_memory());

    let swap = vm.swap();
    w.u64(swap.disk_reads());
    w.u64(swap.disk_writes());
    w.len(swap.num_blocks());
    for block in swap.blocks() {
        w.bool(block.used);
        w.opt_u32(block.owner.map(|pid| pid.0));
        w.u32(block.virtual_page);
    }
    w.bytes(swap.area());

    let sched = ctx.scheduler();
    let stats = sched.stats();
    w.u32(sched.next_pid());
    w.opt_u32(sched.running().map(|pid| pid.0));
    w.u64(stats.ticks);
    w.u64(stats.context_switches);
    w.u64(stats.preemptions);
    w.u64(stats.slice_expirations);
    for priority in PRIORITIES {
        w.pids(sched.ready_queue(priority));
    }
    w.pids(sched.blocked_queue());

    let processes = ctx.processes();
    w.len(processes.len());
    for pcb in processes.iter() {
        w.u32(pcb.pid.0);
        w.bytes(pcb.name.as_bytes());
        w.u8(state_code(pcb.state));
        w.u8(pcb.priority.level());
        w.u32(pcb.time_slice);
        w.u32(pcb.time_slice_total);
        w.bool(pcb.preempted);
        w.u32(pcb.layout.code.num_pages);
        w.u32(pcb.layout.data.num_pages);
        w.u32(pcb.layout.heap.num_pages);
        w.u32(pcb.layout.stack.num_pages);

        w.len(pcb.page_table.len());
        for pte in pcb.page_table.entries() {
            w.u8(pte.flags().bits());
            w.opt_u32(pte.frame().map(|f| f.0));
            w.opt_u32(pte.swap_index().map(|s| s.0));
            w.u64(pte.last_access);
        }

        let s = &pcb.stats;
        for counter in [
            s.memory_accesses,
            s.page_faults,
            s.swap_ins,
            s.swap_outs,
            s.cpu_ticks,
            s.preemptions,
            s.slice_expirations,
            s.dispatches,
        ] {
            w.u64(counter);
        }
    }

    w.buf
}

/// Rebuild a simulation from [`save`] output
pub fn restore(data: &[u8]) -> Result<SystemContext> {
    let mut r = Reader { buf: data, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(corrupt(format!("unsupported version {}", version)));
    }

    let config = SystemConfig {
        physical_pages: r.size()?,
        swap_size: r.size()?,
        max_process_pages: r.size()?,
        max_processes: r.size()?,
        time_slice: r.u32()?,
        min_resident_percent: r.u32()?,
        victim_floor_percent: r.u32()?,
        heap_pages: r.u32()?,
        stack_pages: r.u32()?,
    };
    config.validate()?;

    let counters = VmCounters {
        total_accesses: r.u64()?,
        page_faults: r.u64()?,
        page_replacements: r.u64()?,
        swap_ins: r.u64()?,
        swap_outs: r.u64()?,
    };

    let clock = r.u64()?;
    let num_frames = r.len(15)?;
    if num_frames != config.physical_pages {
        return Err(corrupt(format!(
            "{} frames saved for {} configured",
            num_frames, config.physical_pages
        )));
    }
    let mut frames = Vec::with_capacity(num_frames);
    for _ in 0..num_frames {
        frames.push(Frame {
            allocated: r.bool()?,
            owner: r.opt_u32()?.map(Pid),
            virtual_page: r.u32()?,
            dirty: r.bool()?,
            last_access: r.u64()?,
        });
    }
    let num_words = r.len(8)?;
    let words = (0..num_words).map(|_| r.u64()).collect::<Result<Vec<_>>>()?;
    let bitmap = FrameBitmap::from_words(words, num_frames)
        .ok_or_else(|| corrupt("bitmap size mismatch"))?;
    let memory = r.bytes()?;
    let frame_table = PhysicalFrameTable::from_parts(frames, bitmap, memory, clock)?;

    let disk_reads = r.u64()?;
    let disk_writes = r.u64()?;
    let num_blocks = r.len(6)?;
    if num_blocks != config.swap_size {
        return Err(corrupt(format!(
            "{} swap blocks saved for {} configured",
            num_blocks, config.swap_size
        )));
    }
    let mut blocks = Vec::with_capacity(num_blocks);
    for _ in 0..num_blocks {
        blocks.push(SwapBlock {
            used: r.bool()?,
            owner: r.opt_u32()?.map(Pid),
            virtual_page: r.u32()?,
        });
    }
    let area = r.bytes()?;
    let swap = SwapSpace::from_parts(blocks, area, disk_reads, disk_writes)?;

    let next_pid = r.u32()?;
    let running = r.opt_u32()?.map(Pid);
    let stats = SchedulerStats {
        ticks: r.u64()?,
        context_switches: r.u64()?,
        preemptions: r.u64()?,
        slice_expirations: r.u64()?,
    };
    let mut ready: [VecDeque<Pid>; NUM_PRIORITIES] = Default::default();
    for queue in ready.iter_mut() {
        *queue = r.pids()?;
    }
    let blocked = r.pids()?;
    let mut scheduler = ProcessScheduler::new(&config);
    scheduler.restore(ready, blocked, running, next_pid, stats);

    let mut processes = ProcessTable::new();
    let count = r.len(4)?;
    for _ in 0..count {
        let pid = Pid(r.u32()?);
        let name = String::from_utf8(r.bytes()?)
            .map_err(|_| corrupt(format!("pid {} name is not UTF-8", pid)))?;
        let state = state_from_code(r.u8()?)?;
        let priority = Priority::new(r.u8()?)?;
        let time_slice = r.u32()?;
        let time_slice_total = r.u32()?;
        let preempted = r.bool()?;
        let layout = ProcessMemoryLayout::new(r.u32()?, r.u32()?, r.u32()?, r.u32()?)
            .ok_or_else(|| corrupt(format!("pid {} layout overflows the page space", pid)))?;
        if layout.total_pages() > config.max_process_pages {
            return Err(corrupt(format!("pid {} has {} pages", pid, layout.total_pages())));
        }

        let num_entries = r.len(11)?;
        if num_entries != layout.total_pages() {
            return Err(corrupt(format!(
                "pid {} has {} entries for {} pages",
                pid,
                num_entries,
                layout.total_pages()
            )));
        }
        let mut entries = Vec::with_capacity(num_entries);
        for page in 0..num_entries {
            let flags = PteFlags::from_bits(r.u8()?)
                .ok_or_else(|| corrupt(format!("pid {} page {} has unknown flags", pid, page)))?;
            let frame = r.opt_u32()?.map(FrameId);
            let swap_index = r.opt_u32()?.map(SwapIndex);
            let last_access = r.u64()?;
            let pte = PageTableEntry::from_parts(flags, frame, swap_index, last_access)
                .ok_or_else(|| {
                    corrupt(format!("pid {} page {} has contradictory state", pid, page))
                })?;
            entries.push(pte);
        }

        let mut pcb = ProcessControlBlock::new(pid, &name, priority, layout, time_slice_total);
        pcb.state = state;
        pcb.time_slice = time_slice;
        pcb.preempted = preempted;
        pcb.page_table = PageTable::from_entries(entries);
        pcb.stats = ProcessStats {
            memory_accesses: r.u64()?,
            page_faults: r.u64()?,
            swap_ins: r.u64()?,
            swap_outs: r.u64()?,
            cpu_ticks: r.u64()?,
            preemptions: r.u64()?,
            slice_expirations: r.u64()?,
            dispatches: r.u64()?,
        };
        if processes.contains(pid) {
            return Err(corrupt(format!("pid {} saved twice", pid)));
        }
        processes.insert(pcb);
    }
    r.finish()?;

    let vm = VirtualMemoryManager::from_parts(frame_table, swap, counters);
    SystemContext::from_parts(config, vm, processes, scheduler)
}

pub fn save_to_file<P: AsRef<Path>>(ctx: &SystemContext, path: P) -> Result<()> {
    fs::write(path.as_ref(), save(ctx))
        .map_err(|e| corrupt(format!("failed to write snapshot: {}", e)))
}

pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<SystemContext> {
    let data =
        fs::read(path.as_ref()).map_err(|e| corrupt(format!("failed to read snapshot: {}", e)))?;
    restore(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PAGE_SIZE;
    use crate::observer::NullObserver;

    fn busy_system() -> (SystemContext, Pid, Pid) {
        let config = SystemConfig {
            physical_pages: 6,
            swap_size: 8,
            time_slice: 3,
            ..SystemConfig::default()
        }
        .without_default_segments();
        let mut ctx = SystemContext::new(config).unwrap().with_observer(Box::new(NullObserver));
        let a = ctx.create_process("editor", Priority::NORMAL, 4, 0).unwrap();
        let b = ctx.create_process("daemon", Priority::LOW, 4, 0).unwrap();
        ctx.schedule().unwrap();
        ctx.write_memory(a, PAGE_SIZE as u32 + 8, b"saved bytes").unwrap();
        ctx.time_ticks(2).unwrap();
        ctx.block_process(b).unwrap();
        (ctx, a, b)
    }

    #[test]
    fn test_restore_reproduces_state() {
        let (ctx, a, b) = busy_system();
        let data = save(&ctx);
        assert_eq!(&data[..4], MAGIC);

        let mut restored = restore(&data).unwrap();
        assert_eq!(restored.config(), ctx.config());
        assert_eq!(restored.get_memory_stats(), ctx.get_memory_stats());
        assert_eq!(restored.get_frames(), ctx.get_frames());
        assert_eq!(restored.get_swap_blocks(), ctx.get_swap_blocks());
        assert_eq!(restored.get_running_process().map(|p| p.pid), Some(a));
        assert_eq!(restored.scheduler().blocked_queue(), &VecDeque::from([b]));
        assert_eq!(restored.scheduler().stats(), ctx.scheduler().stats());

        let before = ctx.get_process_by_pid(a).unwrap();
        let after = restored.get_process_by_pid(a).unwrap();
        assert_eq!(after.name, "editor");
        assert_eq!(after.page_table, before.page_table);
        assert_eq!(after.stats, before.stats);
        assert_eq!(after.time_slice, before.time_slice);

        assert_eq!(restored.read_memory(a, PAGE_SIZE as u32 + 8, 11).unwrap(), b"saved bytes");
        assert_eq!(restored.scheduler().next_pid(), 3);
    }

    #[test]
    fn test_restore_rejects_bad_header() {
        let (ctx, _, _) = busy_system();
        let mut data = save(&ctx);

        let mut wrong_magic = data.clone();
        wrong_magic[0] = b'X';
        assert_eq!(restore(&wrong_magic).unwrap_err(), VmError::Snapshot("bad magic".into()));

        data[4] = 2;
        assert_eq!(restore(&data).unwrap_err(), VmError::Snapshot("unsupported version 2".into()));
    }

    #[test]
    fn test_restore_rejects_truncation_and_trailing_bytes() {
        let (ctx, _, _) = busy_system();
        let data = save(&ctx);

        assert!(matches!(restore(&data[..data.len() - 1]), Err(VmError::Snapshot(_))));

        let mut longer = data.clone();
        longer.push(0);
        assert_eq!(restore(&longer).unwrap_err(), VmError::Snapshot("1 trailing bytes".into()));
    }

    #[test]
    fn test_restore_runs_consistency_check() {
        let (ctx, _, _) = busy_system();
        let mut data = save(&ctx);

        // magic, version, config, counters, clock and frame count precede frame 0
        let frame0 = 4 + 4 + 4 * 8 + 5 * 4 + 5 * 8 + 8 + 8;
        assert_eq!(data[frame0], 1);
        data[frame0] = 0;
        assert!(matches!(restore(&data), Err(VmError::InconsistentState(_))));
    }
}
