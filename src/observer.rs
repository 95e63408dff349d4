//! Observability hooks.
//!
//! Core logic only records [`Event`]s; the owning context hands them to an
//! [`Observer`] once the operation completes.

use log::{debug, info, trace, warn};

use crate::error::VmError;
use crate::memory::FrameId;
use crate::process::{Pid, Priority};
use crate::swap::SwapIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PageFault { pid: Pid, page: u32 },
    /// A resident page was chosen to make room for `(for_pid, for_page)`
    Replacement { victim: Pid, victim_page: u32, frame: FrameId, for_pid: Pid },
    SwapOut { pid: Pid, page: u32, frame: FrameId, block: SwapIndex },
    SwapIn { pid: Pid, page: u32, frame: FrameId, block: SwapIndex },
    ProcessCreated { pid: Pid, priority: Priority, pages: usize },
    CreationRolledBack { pid: Pid, error: VmError },
    ProcessDestroyed { pid: Pid, frames_released: usize, blocks_released: usize },
    Dispatched { pid: Pid, paged_in: usize },
    Preempted { pid: Pid, by: Pid },
    SliceExpired { pid: Pid },
    Blocked { pid: Pid },
    Unblocked { pid: Pid },
    PriorityChanged { pid: Pid, priority: Priority },
    Tick { running: Option<Pid> },
}

pub trait Observer {
    fn on_event(&mut self, event: &Event);
}

/// Forwards events to the `log` facade
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_event(&mut self, event: &Event) {
        match event {
            Event::PageFault { pid, page } => debug!("page fault: pid {} page {}", pid, page),
            Event::Replacement { victim, victim_page, frame, for_pid } => debug!(
                "replacing pid {} page {} in frame {} for pid {}",
                victim, victim_page, frame, for_pid
            ),
            Event::SwapOut { pid, page, frame, block } => {
                debug!("swap out: pid {} page {} frame {} -> block {}", pid, page, frame, block)
            }
            Event::SwapIn { pid, page, frame, block } => {
                debug!("swap in: pid {} page {} block {} -> frame {}", pid, page, block, frame)
            }
            Event::ProcessCreated { pid, priority, pages } => {
                info!("created pid {} (priority {}, {} pages)", pid, priority, pages)
            }
            Event::CreationRolledBack { pid, error } => {
                warn!("creation of pid {} rolled back: {}", pid, error)
            }
            Event::ProcessDestroyed { pid, frames_released, blocks_released } => info!(
                "destroyed pid {} ({} frames, {} swap blocks released)",
                pid, frames_released, blocks_released
            ),
            Event::Dispatched { pid, paged_in } => {
                info!("dispatch pid {} ({} pages brought in)", pid, paged_in)
            }
            Event::Preempted { pid, by } => info!("pid {} preempted by pid {}", pid, by),
            Event::SliceExpired { pid } => debug!("time slice expired for pid {}", pid),
            Event::Blocked { pid } => info!("pid {} blocked", pid),
            Event::Unblocked { pid } => info!("pid {} unblocked", pid),
            Event::PriorityChanged { pid, priority } => {
                info!("pid {} priority now {}", pid, priority)
            }
            Event::Tick { running } => match running {
                Some(pid) => trace!("tick: pid {}", pid),
                None => trace!("tick: idle"),
            },
        }
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_event(&mut self, _event: &Event) {}
}

/// Keeps every event it sees; handy in tests
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<Event>,
}

impl Observer for RecordingObserver {
    fn on_event(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

/// Pending events waiting to be handed to an observer
#[derive(Debug, Default)]
pub struct EventLog {
    pending: Vec<Event>,
}

impl EventLog {
    pub fn record(&mut self, event: Event) {
        self.pending.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn dispatch(&mut self, observer: &mut dyn Observer) {
        for event in self.pending.drain(..) {
            observer.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_drains_in_order() {
        let mut log = EventLog::default();
        log.record(Event::PageFault { pid: Pid(1), page: 0 });
        log.record(Event::SliceExpired { pid: Pid(1) });

        let mut recorder = RecordingObserver::default();
        log.dispatch(&mut recorder);

        assert!(log.is_empty());
        assert_eq!(
            recorder.events,
            vec![Event::PageFault { pid: Pid(1), page: 0 }, Event::SliceExpired { pid: Pid(1) }]
        );
    }

    #[test]
    fn test_log_observer_accepts_everything() {
        let mut observer = LogObserver;
        observer.on_event(&Event::Tick { running: None });
        observer
            .on_event(&Event::CreationRolledBack { pid: Pid(2), error: VmError::OutOfSwapSpace });
    }
}
