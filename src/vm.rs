use crate::constants::*;
use crate::error::{Result, VmError};
use crate::memory::{FrameId, PhysicalFrameTable};
use crate::observer::{Event, EventLog, Observer};
use crate::process::{Pid, ProcessControlBlock, ProcessTable};
use crate::replacement::{select_victim_frame, select_victim_page};
use crate::swap::{SwapIndex, SwapSpace};
use crate::translation::{TranslationResult, VirtualAddress, translate};

/// Global paging counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmCounters {
    pub total_accesses: u64,
    pub page_faults: u64,
    pub page_replacements: u64,
    pub swap_ins: u64,
    pub swap_outs: u64,
}

/// Point-in-time view of the memory subsystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_accesses: u64,
    pub page_faults: u64,
    pub page_replacements: u64,
    pub swap_ins: u64,
    pub swap_outs: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub total_frames: usize,
    pub free_frames: usize,
    pub swap_blocks: usize,
    pub swap_free_blocks: usize,
}

/// Outcome of a single translated access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOutcome {
    pub frame: FrameId,
    pub physical_address: usize,
    /// The access had to fault the page in
    pub faulted: bool,
}

/// Page-fault handling, swap I/O and access accounting over one frame table
/// and one swap area.
pub struct VirtualMemoryManager {
    frames: PhysicalFrameTable,
    swap: SwapSpace,
    counters: VmCounters,
    events: EventLog,
}

impl VirtualMemoryManager {
    pub fn new(physical_pages: usize, swap_size: usize) -> Self {
        VirtualMemoryManager {
            frames: PhysicalFrameTable::new(physical_pages),
            swap: SwapSpace::new(swap_size),
            counters: VmCounters::default(),
            events: EventLog::default(),
        }
    }

    pub fn from_parts(frames: PhysicalFrameTable, swap: SwapSpace, counters: VmCounters) -> Self {
        VirtualMemoryManager { frames, swap, counters, events: EventLog::default() }
    }

    pub fn frames(&self) -> &PhysicalFrameTable {
        &self.frames
    }

    pub fn swap(&self) -> &SwapSpace {
        &self.swap
    }

    pub fn counters(&self) -> VmCounters {
        self.counters
    }

    pub fn record(&mut self, event: Event) {
        self.events.record(event);
    }

    pub fn dispatch_events(&mut self, observer: &mut dyn Observer) {
        self.events.dispatch(observer);
    }

    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            total_accesses: self.counters.total_accesses,
            page_faults: self.counters.page_faults,
            page_replacements: self.counters.page_replacements,
            swap_ins: self.counters.swap_ins,
            swap_outs: self.counters.swap_outs,
            disk_reads: self.swap.disk_reads(),
            disk_writes: self.swap.disk_writes(),
            total_frames: self.frames.num_frames(),
            free_frames: self.frames.free_count(),
            swap_blocks: self.swap.num_blocks(),
            swap_free_blocks: self.swap.free_blocks(),
        }
    }

    /// Move a resident frame's page out to swap and free the frame.
    ///
    /// Fails without changing anything when the owner cannot be resolved or
    /// swap is full.
    pub fn swap_out_page(
        &mut self,
        processes: &mut ProcessTable,
        frame: FrameId,
    ) -> Result<SwapIndex> {
        let entry = self.frames.frame(frame)?;
        let pid = match (entry.allocated, entry.owner) {
            (true, Some(pid)) => pid,
            _ => return Err(VmError::InvalidFrame(frame)),
        };
        let vpage = entry.virtual_page;

        let pcb = processes.require_mut(pid)?;
        let pte = pcb
            .page_table
            .get_mut(vpage)
            .ok_or(VmError::InvalidPage { pid, page: vpage })?;
        if !pte.is_present() || pte.frame() != Some(frame) {
            return Err(VmError::InconsistentState(format!(
                "frame {} claims pid {} page {} but the page table disagrees",
                frame, pid, vpage
            )));
        }

        let block = self.swap.allocate_swap_block(pid, vpage)?;
        let written = self
            .frames
            .page(frame)
            .and_then(|contents| self.swap.write_to_swap(block, contents));
        if let Err(e) = written {
            self.swap.free_swap_block(block)?;
            return Err(e);
        }

        // The bytes are durable now; only then does the page leave memory
        pte.set_swapped(block);
        self.frames.free_frame(frame)?;

        self.counters.swap_outs += 1;
        pcb.stats.swap_outs += 1;
        self.events.record(Event::SwapOut { pid, page: vpage, frame, block });
        Ok(block)
    }

    /// Restore `(pid, vpage)` from swap into an already claimed frame
    pub fn swap_in_page(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vpage: u32,
        frame: FrameId,
    ) -> Result<SwapIndex> {
        let pcb = processes.require_mut(pid)?;
        let pte = pcb
            .page_table
            .get_mut(vpage)
            .ok_or(VmError::InvalidPage { pid, page: vpage })?;
        if !pte.is_swapped() {
            return Err(VmError::InvalidPage { pid, page: vpage });
        }

        let block = self.swap.find_block(pid, vpage).ok_or_else(|| {
            VmError::InconsistentState(format!("no swap block holds pid {} page {}", pid, vpage))
        })?;
        if pte.swap_index() != Some(block) {
            return Err(VmError::InconsistentState(format!(
                "pid {} page {} points at block {:?}, found in block {}",
                pid,
                vpage,
                pte.swap_index(),
                block
            )));
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        self.swap.read_from_swap(block, &mut buf)?;
        self.frames.load_page(frame, &buf)?;
        self.swap.free_swap_block(block)?;

        let now = self.frames.touch(frame)?;
        pte.set_present(frame, now);

        self.counters.swap_ins += 1;
        pcb.stats.swap_ins += 1;
        self.events.record(Event::SwapIn { pid, page: vpage, frame, block });
        Ok(block)
    }

    /// Back `(pid, vpage)` with a frame, evicting through the global policy
    /// when memory is full.
    ///
    /// A victim that was already swapped out stays swapped out even if a later
    /// step fails.
    pub fn handle_page_fault(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vpage: u32,
    ) -> Result<FrameId> {
        let pte = processes
            .require(pid)?
            .page_table
            .get(vpage)
            .ok_or(VmError::InvalidPage { pid, page: vpage })?;
        if let (true, Some(frame)) = (pte.is_present(), pte.frame()) {
            return Ok(frame);
        }
        let was_swapped = pte.is_swapped();
        self.events.record(Event::PageFault { pid, page: vpage });

        let frame = match self.frames.allocate_frame(pid, vpage) {
            Ok(frame) => frame,
            Err(VmError::OutOfPhysicalMemory) => self.replace_frame(processes, pid, vpage)?,
            Err(e) => return Err(e),
        };

        if was_swapped {
            if let Err(e) = self.swap_in_page(processes, pid, vpage, frame) {
                self.frames.free_frame(frame)?;
                return Err(e);
            }
        } else {
            self.frames.zero_frame(frame)?;
            let now = self.frames.touch(frame)?;
            let pte = processes
                .require_mut(pid)?
                .page_table
                .get_mut(vpage)
                .ok_or(VmError::InvalidPage { pid, page: vpage })?;
            pte.set_present(frame, now);
        }

        self.counters.page_faults += 1;
        processes.require_mut(pid)?.stats.page_faults += 1;
        Ok(frame)
    }

    fn replace_frame(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vpage: u32,
    ) -> Result<FrameId> {
        let victim = select_victim_frame(&self.frames).ok_or(VmError::OutOfPhysicalMemory)?;
        let entry = self.frames.frame(victim)?;
        let victim_pid = entry.owner.ok_or(VmError::InvalidFrame(victim))?;
        let victim_page = entry.virtual_page;

        self.swap_out_page(processes, victim)?;
        self.counters.page_replacements += 1;
        self.events.record(Event::Replacement {
            victim: victim_pid,
            victim_page,
            frame: victim,
            for_pid: pid,
        });
        self.frames.allocate_frame(pid, vpage)
    }

    /// Translate and account one access, faulting the page in if needed
    pub fn access_memory(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vaddr: u32,
        is_write: bool,
    ) -> Result<AccessOutcome> {
        let va = VirtualAddress::from_raw(vaddr);
        let translation = translate(&va, &processes.require(pid)?.page_table);
        if translation == TranslationResult::InvalidPage {
            return Err(VmError::InvalidAddress { pid, vaddr });
        }
        self.counters.total_accesses += 1;

        let (frame, faulted) = match translation {
            TranslationResult::Resident { frame, .. } => (frame, false),
            _ => (self.handle_page_fault(processes, pid, va.page)?, true),
        };

        let now = self.frames.touch(frame)?;
        let pcb = processes.require_mut(pid)?;
        pcb.stats.memory_accesses += 1;
        let pte = pcb
            .page_table
            .get_mut(va.page)
            .ok_or(VmError::InvalidPage { pid, page: va.page })?;
        pte.last_access = now;
        if is_write {
            pte.set_dirty();
            self.frames.set_dirty(frame, true)?;
        }

        Ok(AccessOutcome {
            frame,
            physical_address: frame.base_address() + va.offset as usize,
            faulted,
        })
    }

    fn check_span(processes: &ProcessTable, pid: Pid, vaddr: u32, len: usize) -> Result<()> {
        let pages = processes.require(pid)?.total_pages() as u64;
        let end = vaddr as u64 + len as u64;
        if len > 0 && (end - 1) >> PAGE_SHIFT >= pages {
            return Err(VmError::InvalidAddress { pid, vaddr });
        }
        Ok(())
    }

    /// Read `len` bytes starting at `vaddr`, faulting pages in as needed
    pub fn read_memory(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vaddr: u32,
        len: usize,
    ) -> Result<Vec<u8>> {
        Self::check_span(processes, pid, vaddr, len)?;

        let mut out = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let va = VirtualAddress::from_raw(vaddr + done as u32);
            let chunk = va.remaining_in_page().min(len - done);
            let access = self.access_memory(processes, pid, va.va, false)?;
            let dest = &mut out[done..done + chunk];
            self.frames.read_physical_memory(access.frame, va.offset as usize, dest)?;
            done += chunk;
        }
        Ok(out)
    }

    /// Write `data` starting at `vaddr`, faulting pages in as needed
    pub fn write_memory(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vaddr: u32,
        data: &[u8],
    ) -> Result<()> {
        Self::check_span(processes, pid, vaddr, data.len())?;

        let mut done = 0;
        while done < data.len() {
            let va = VirtualAddress::from_raw(vaddr + done as u32);
            let chunk = va.remaining_in_page().min(data.len() - done);
            let access = self.access_memory(processes, pid, va.va, true)?;
            let src = &data[done..done + chunk];
            self.frames.write_physical_memory(access.frame, va.offset as usize, src)?;
            done += chunk;
        }
        Ok(())
    }

    /// Make `(pid, vpage)` resident
    pub fn page_in(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vpage: u32,
    ) -> Result<FrameId> {
        self.handle_page_fault(processes, pid, vpage)
    }

    /// Push a resident `(pid, vpage)` out to swap
    pub fn page_out(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        vpage: u32,
    ) -> Result<SwapIndex> {
        let frame = processes
            .require(pid)?
            .page_table
            .get(vpage)
            .filter(|pte| pte.is_present())
            .and_then(|pte| pte.frame())
            .ok_or(VmError::InvalidPage { pid, page: vpage })?;
        self.swap_out_page(processes, frame)
    }

    /// Fault in every page of a freshly created process
    pub fn load_process(&mut self, processes: &mut ProcessTable, pid: Pid) -> Result<()> {
        let pages = processes.require(pid)?.total_pages() as u32;
        for page in 0..pages {
            self.handle_page_fault(processes, pid, page)?;
        }
        Ok(())
    }

    /// Bring pages of `pid` in until its resident share reaches `min_percent`
    /// or nothing more can be brought in. Returns how many pages came in.
    pub fn ensure_resident(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        min_percent: u32,
        floor_percent: u32,
    ) -> Result<usize> {
        let mut paged_in = 0;
        loop {
            let pcb = processes.require(pid)?;
            if pcb.total_pages() == 0 || pcb.resident_percent() >= min_percent {
                break;
            }
            let Some(page) = pcb.page_table.next_absent() else {
                break;
            };

            if self.frames.free_count() == 0 {
                let Some((victim, victim_page)) =
                    select_victim_page(processes, pid, floor_percent)
                else {
                    break;
                };
                let Some(frame) = processes
                    .get(victim)
                    .and_then(|p| p.page_table.get(victim_page))
                    .and_then(|pte| pte.frame())
                else {
                    break;
                };
                if self.swap_out_page(processes, frame).is_err() {
                    break;
                }
                self.counters.page_replacements += 1;
                self.events.record(Event::Replacement { victim, victim_page, frame, for_pid: pid });
            }

            if self.handle_page_fault(processes, pid, page).is_err() {
                break;
            }
            paged_in += 1;
        }
        Ok(paged_in)
    }

    /// Release every frame and swap block held by a PCB.
    ///
    /// Returns `(frames_released, blocks_released)`.
    pub fn release_process(&mut self, pcb: &mut ProcessControlBlock) -> Result<(usize, usize)> {
        let mut frames_released = 0;
        let resident: Vec<FrameId> = pcb
            .page_table
            .iter()
            .filter(|(_, pte)| pte.is_present())
            .filter_map(|(_, pte)| pte.frame())
            .collect();
        for frame in resident {
            self.frames.free_frame(frame)?;
            frames_released += 1;
        }

        let blocks_released = self.swap.release_owner(pcb.pid);
        pcb.page_table = Default::default();
        Ok((frames_released, blocks_released))
    }

    /// Free swap blocks whose owner is gone
    pub fn swap_clean(&mut self, processes: &ProcessTable) -> usize {
        self.swap.retain_owners(|pid| processes.contains(pid))
    }

    /// Cross-check the frame table, swap table and every page table
    pub fn check_state(&self, processes: &ProcessTable) -> Result<()> {
        self.frames.check_state()?;

        let mut present = 0;
        let mut swapped = 0;
        for pcb in processes.iter() {
            for (page, pte) in pcb.page_table.iter() {
                if pte.is_present() && pte.is_swapped() {
                    return Err(VmError::InconsistentState(format!(
                        "pid {} page {} is both present and swapped",
                        pcb.pid, page
                    )));
                }
                if let (true, Some(frame)) = (pte.is_present(), pte.frame()) {
                    let entry = self.frames.frame(frame)?;
                    if !entry.allocated
                        || entry.owner != Some(pcb.pid)
                        || entry.virtual_page != page
                    {
                        return Err(VmError::InconsistentState(format!(
                            "pid {} page {} maps frame {} owned by {:?} page {}",
                            pcb.pid, page, frame, entry.owner, entry.virtual_page
                        )));
                    }
                    present += 1;
                }
                if let (true, Some(block)) = (pte.is_swapped(), pte.swap_index()) {
                    let entry = self.swap.block(block)?;
                    if !entry.used || entry.owner != Some(pcb.pid) || entry.virtual_page != page {
                        return Err(VmError::InconsistentState(format!(
                            "pid {} page {} points at swap block {} owned by {:?} page {}",
                            pcb.pid, page, block, entry.owner, entry.virtual_page
                        )));
                    }
                    swapped += 1;
                }
            }
        }

        if present != self.frames.allocated_count() {
            return Err(VmError::InconsistentState(format!(
                "{} resident pages but {} allocated frames",
                present,
                self.frames.allocated_count()
            )));
        }
        if swapped != self.swap.used_blocks() {
            return Err(VmError::InconsistentState(format!(
                "{} swapped pages but {} used swap blocks",
                swapped,
                self.swap.used_blocks()
            )));
        }
        Ok(())
    }
}

impl Default for VirtualMemoryManager {
    fn default() -> Self {
        Self::new(PHYSICAL_PAGES, SWAP_SIZE)
    }
}
