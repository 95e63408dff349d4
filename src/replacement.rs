//! Victim selection for page replacement.
//!
//! Two policies exist and serve different callers:
//!
//! - [`select_victim_frame`] is the global policy behind every page fault:
//!   least recently used, preferring clean frames so no write-back is needed.
//! - [`select_victim_page`] is the fairness policy used only while a specific
//!   process is being prepared for the CPU. It never takes pages from a process
//!   already at or below the resident floor.

use crate::memory::{FrameId, PhysicalFrameTable};
use crate::process::{Pid, ProcessTable};

/// Pick the least recently used process-owned frame, clean frames first.
///
/// Ties go to the lowest frame number.
pub fn select_victim_frame(frames: &PhysicalFrameTable) -> Option<FrameId> {
    oldest_frame(frames, true).or_else(|| oldest_frame(frames, false))
}

fn oldest_frame(frames: &PhysicalFrameTable, clean_only: bool) -> Option<FrameId> {
    let mut victim: Option<(usize, u64)> = None;
    for (index, frame) in frames.frames().iter().enumerate() {
        if !frame.allocated || frame.owner.is_none() {
            continue;
        }
        if clean_only && frame.dirty {
            continue;
        }
        match victim {
            Some((_, oldest)) if oldest <= frame.last_access => {}
            _ => victim = Some((index, frame.last_access)),
        }
    }
    victim.map(|(index, _)| FrameId(index as u32))
}

/// Pick a `(pid, page)` to evict on behalf of `exclude`.
///
/// Candidates are the other live processes whose resident percentage is above
/// `floor_percent`; the victim is the oldest present page among them. With no
/// candidate, the process holding the most present pages gives up its oldest
/// page instead.
pub fn select_victim_page(
    processes: &ProcessTable,
    exclude: Pid,
    floor_percent: u32,
) -> Option<(Pid, u32)> {
    let mut best: Option<(Pid, u32, u64)> = None;

    for pcb in processes.live().filter(|p| p.pid != exclude) {
        if pcb.total_pages() == 0 || pcb.resident_percent() <= floor_percent {
            continue;
        }
        let Some((page, stamp)) = pcb.page_table.oldest_present() else {
            continue;
        };
        match best {
            Some((_, _, oldest)) if oldest <= stamp => {}
            _ => best = Some((pcb.pid, page, stamp)),
        }
    }

    if let Some((pid, page, _)) = best {
        return Some((pid, page));
    }

    // Fall back to the largest resident set, lowest pid on ties
    let mut largest: Option<(Pid, usize)> = None;
    for pcb in processes.live().filter(|p| p.pid != exclude) {
        let present = pcb.present_pages();
        if present == 0 {
            continue;
        }
        match largest {
            Some((_, most)) if most >= present => {}
            _ => largest = Some((pcb.pid, present)),
        }
    }

    let (pid, _) = largest?;
    let (page, _) = processes.get(pid)?.page_table.oldest_present()?;
    Some((pid, page))
}
