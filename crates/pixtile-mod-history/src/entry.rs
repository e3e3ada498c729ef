/// The contract every history entry fulfills.
use crate::offload::OffloadService;

/// One undoable edit, replayed against its `Target`.
///
/// `undo` and `redo` take `&mut self` because entries may own state that
/// moves between the entry and the target (a removed layer subtree lives in
/// the entry while the removal is applied, and back in the target once undone).
pub trait HistoryEntry {
    /// State the entry replays against.
    type Target: ?Sized;

    /// Reverses the edit.
    fn undo(&mut self, target: &mut Self::Target);

    /// Re-applies the edit.
    fn redo(&mut self, target: &mut Self::Target);

    /// Fixed human-readable label.
    fn description(&self) -> &str;

    /// Stable icon key for history panels.
    fn icon(&self) -> &'static str;

    /// False when the entry would replay as a no-op; such entries are never pushed.
    fn has_changes(&self) -> bool;

    /// Estimated resident size of the entry's heavy buffers.
    fn estimated_bytes(&self) -> usize {
        0
    }

    /// Whether the heavy buffers currently live in an offload service.
    fn is_offloaded(&self) -> bool {
        false
    }

    /// Moves heavy buffers into `service`. Returns false when the entry
    /// doesn't support offloading or the write failed; the entry stays resident.
    fn offload(&mut self, _service: &dyn OffloadService) -> bool {
        false
    }

    /// Brings offloaded buffers back. Returns false and leaves the entry
    /// offloaded when the blob cannot be read.
    fn reload(&mut self, _service: &dyn OffloadService) -> bool {
        true
    }

    /// Releases any blob the entry owns. Called when the entry leaves both stacks.
    fn discard(&mut self, _service: &dyn OffloadService) {}
}

/// One row of the chronological history view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub description: String,
    pub icon: &'static str,
    /// True for entries on the undo stack (currently applied).
    pub applied: bool,
}
