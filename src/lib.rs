pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod memory;
pub mod observer;
pub mod page_table;
pub mod process;
pub mod replacement;
pub mod scheduler;
pub mod snapshot;
pub mod swap;
pub mod system;
pub mod translation;
pub mod vm;

// Re-export commonly used items for convenience
pub use config::SystemConfig;
pub use constants::*;
pub use error::{Result, VmError};
pub use observer::{Event, LogObserver, NullObserver, Observer, RecordingObserver};
pub use process::{Pid, Priority, ProcessState};
pub use system::SystemContext;
pub use translation::{TranslationResult, VirtualAddress};
pub use vm::{AccessOutcome, MemoryStats};
