/// Unified undo/redo history with offloadable entries.
///
/// Provides a `UnifiedHistoryStack` that replays entries against any target
/// type, and an `OffloadService` that lets heavy entries move their buffers
/// to a per-session temporary directory and bring them back on demand.
pub mod config;
pub mod entry;
pub mod notify;
pub mod offload;
pub mod stack;

pub use config::HistoryConfig;
pub use entry::{HistoryEntry, TimelineEntry};
pub use notify::EventBus;
pub use offload::{Offloadable, OffloadService, TempDirOffloadStore};
pub use stack::{HistoryEvent, UnifiedHistoryStack};
