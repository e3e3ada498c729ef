/// Undo/redo stacks with dirty tracking, timeline navigation and memory limits.
///
/// Entries are kept in memory until the resident estimate exceeds the
/// configured budget; then the oldest undo entries are offloaded through the
/// attached `OffloadService`. An offloaded entry is reloaded right before it
/// is replayed.
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::config::HistoryConfig;
use crate::entry::{HistoryEntry, TimelineEntry};
use crate::notify::EventBus;
use crate::offload::OffloadService;

/// Notification emitted after the stacks change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEvent {
    Pushed,
    Undone,
    Redone,
    /// A `jump_to` finished; intermediate steps are not reported.
    Jumped,
    Cleared,
    Saved,
}

/// Undo depth recorded by `mark_saved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SavePoint {
    Never,
    At(usize),
    /// The saved state was discarded from history and can't be reached again.
    Unreachable,
}

/// An undo stack and a redo stack of entries of type `E`.
///
/// The top of `undo` is the most recently applied entry, the top of `redo`
/// the most recently undone one.
pub struct UnifiedHistoryStack<E> {
    undo: Vec<E>,
    redo: Vec<E>,
    saved: SavePoint,
    config: HistoryConfig,
    offload: Option<Arc<dyn OffloadService>>,
    events: EventBus<HistoryEvent>,
}

impl<E> std::fmt::Debug for UnifiedHistoryStack<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedHistoryStack")
            .field("undo_len", &self.undo.len())
            .field("redo_len", &self.redo.len())
            .field("saved", &self.saved)
            .field("offload", &self.offload.is_some())
            .finish()
    }
}

impl<E> Default for UnifiedHistoryStack<E> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<E> UnifiedHistoryStack<E> {
    /// Creates an empty stack that keeps everything in memory.
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            saved: SavePoint::Never,
            config,
            offload: None,
            events: EventBus::new(),
        }
    }

    /// Creates an empty stack that offloads through `service` when over budget.
    pub fn with_offload(config: HistoryConfig, service: Arc<dyn OffloadService>) -> Self {
        let mut stack = Self::new(config);
        stack.offload = Some(service);
        stack
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn subscribe(&mut self) -> Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Current undo depth.
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    /// Total entries across both stacks.
    pub fn len(&self) -> usize {
        self.undo.len() + self.redo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty() && self.redo.is_empty()
    }

    /// Records the current undo depth as the saved state.
    pub fn mark_saved(&mut self) {
        self.saved = SavePoint::At(self.undo.len());
        self.events.emit(HistoryEvent::Saved);
    }

    /// Whether the current state differs from the last saved one.
    pub fn is_dirty(&self) -> bool {
        match self.saved {
            SavePoint::Never => !self.undo.is_empty(),
            SavePoint::At(depth) => depth != self.undo.len(),
            SavePoint::Unreachable => true,
        }
    }

    /// Iterates undo entries oldest first.
    pub fn undo_entries(&self) -> impl Iterator<Item = &E> {
        self.undo.iter()
    }

    /// Iterates redo entries in the order they would be redone.
    pub fn redo_entries(&self) -> impl Iterator<Item = &E> {
        self.redo.iter().rev()
    }
}

impl<E: HistoryEntry> UnifiedHistoryStack<E> {
    /// Pushes an applied entry. Entries without changes are discarded.
    /// Clears the redo stack.
    pub fn push(&mut self, mut entry: E) {
        if !entry.has_changes() {
            tracing::debug!("Discarding empty history entry '{}'", entry.description());
            if let Some(service) = &self.offload {
                entry.discard(service.as_ref());
            }
            return;
        }

        if let SavePoint::At(depth) = self.saved {
            if depth > self.undo.len() {
                self.saved = SavePoint::Unreachable;
            }
        }
        self.clear_redo();
        self.undo.push(entry);
        self.enforce_limits();
        self.events.emit(HistoryEvent::Pushed);
    }

    /// Undoes the newest entry. Returns false when there is nothing to undo
    /// or the entry could not be brought back from the offload service.
    pub fn undo(&mut self, target: &mut E::Target) -> bool {
        let undone = self.step_undo(target);
        if undone {
            self.events.emit(HistoryEvent::Undone);
        }
        undone
    }

    /// Redoes the most recently undone entry. Returns false when there is
    /// nothing to redo or the entry could not be reloaded.
    pub fn redo(&mut self, target: &mut E::Target) -> bool {
        let redone = self.step_redo(target);
        if redone {
            self.events.emit(HistoryEvent::Redone);
        }
        redone
    }

    /// Undoes or redoes until the undo depth equals `depth`, clamped to
    /// `[0, len]`. Emits a single notification. Returns the reached depth,
    /// which is short of `depth` only if an entry failed to reload.
    pub fn jump_to(&mut self, depth: usize, target: &mut E::Target) -> usize {
        let depth = depth.min(self.len());
        let start = self.undo.len();
        while self.undo.len() > depth {
            if !self.step_undo(target) {
                break;
            }
        }
        while self.undo.len() < depth {
            if !self.step_redo(target) {
                break;
            }
        }
        if self.undo.len() != start {
            self.events.emit(HistoryEvent::Jumped);
        }
        self.undo.len()
    }

    /// Chronological view: undo entries oldest to newest, then redo entries
    /// in the order they would be redone.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        let applied = self.undo.iter().map(|e| (e, true));
        let pending = self.redo.iter().rev().map(|e| (e, false));
        applied
            .chain(pending)
            .map(|(entry, applied)| TimelineEntry {
                description: entry.description().to_string(),
                icon: entry.icon(),
                applied,
            })
            .collect()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo.last().map(|e| e.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo.last().map(|e| e.description())
    }

    /// Summed size estimate of every entry that is not offloaded.
    pub fn resident_bytes(&self) -> usize {
        self.undo
            .iter()
            .chain(self.redo.iter())
            .filter(|e| !e.is_offloaded())
            .map(|e| e.estimated_bytes())
            .sum()
    }

    /// Number of entries whose buffers currently live in the offload service.
    pub fn offloaded_count(&self) -> usize {
        self.undo
            .iter()
            .chain(self.redo.iter())
            .filter(|e| e.is_offloaded())
            .count()
    }

    /// Drops every entry and releases their blobs.
    pub fn clear(&mut self) {
        let drained: Vec<E> = self.undo.drain(..).chain(self.redo.drain(..)).collect();
        self.discard_all(drained);
        self.saved = SavePoint::Never;
        self.events.emit(HistoryEvent::Cleared);
    }

    fn step_undo(&mut self, target: &mut E::Target) -> bool {
        let Some(entry) = self.undo.last_mut() else {
            return false;
        };
        if !ensure_resident(entry, self.offload.as_deref()) {
            return false;
        }
        let Some(mut entry) = self.undo.pop() else {
            return false;
        };
        tracing::debug!("Undo '{}'", entry.description());
        entry.undo(target);
        self.redo.push(entry);
        true
    }

    fn step_redo(&mut self, target: &mut E::Target) -> bool {
        let Some(entry) = self.redo.last_mut() else {
            return false;
        };
        if !ensure_resident(entry, self.offload.as_deref()) {
            return false;
        }
        let Some(mut entry) = self.redo.pop() else {
            return false;
        };
        tracing::debug!("Redo '{}'", entry.description());
        entry.redo(target);
        self.undo.push(entry);
        true
    }

    fn clear_redo(&mut self) {
        let drained: Vec<E> = self.redo.drain(..).collect();
        self.discard_all(drained);
    }

    fn discard_all(&self, entries: Vec<E>) {
        let Some(service) = &self.offload else {
            return;
        };
        for mut entry in entries {
            entry.discard(service.as_ref());
        }
    }

    /// Evicts entries beyond the depth limit, then offloads the oldest
    /// resident entries until the resident estimate fits the budget.
    fn enforce_limits(&mut self) {
        if self.undo.len() > self.config.max_history_depth {
            let excess = self.undo.len() - self.config.max_history_depth;
            let evicted: Vec<E> = self.undo.drain(..excess).collect();
            tracing::debug!("Evicting {excess} oldest history entries");
            self.saved = match self.saved {
                SavePoint::At(depth) if depth >= excess => SavePoint::At(depth - excess),
                SavePoint::At(_) => SavePoint::Unreachable,
                other => other,
            };
            self.discard_all(evicted);
        }

        let Some(service) = self.offload.clone() else {
            return;
        };
        let mut resident = self.resident_bytes();
        if resident <= self.config.max_resident_bytes {
            return;
        }
        let candidates = self.undo.len().saturating_sub(self.config.keep_resident);
        for entry in self.undo.iter_mut().take(candidates) {
            if resident <= self.config.max_resident_bytes {
                break;
            }
            if entry.is_offloaded() {
                continue;
            }
            let size = entry.estimated_bytes();
            if size == 0 {
                continue;
            }
            if entry.offload(service.as_ref()) {
                resident = resident.saturating_sub(size);
            }
        }
    }
}

fn ensure_resident<E: HistoryEntry>(entry: &mut E, service: Option<&dyn OffloadService>) -> bool {
    if !entry.is_offloaded() {
        return true;
    }
    match service {
        Some(service) if entry.reload(service) => true,
        Some(_) => {
            tracing::warn!("Could not reload '{}', skipping replay", entry.description());
            false
        }
        None => {
            tracing::warn!("'{}' is offloaded but no offload service is attached", entry.description());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Adds `amount` to an `i64` counter.
    struct AddEntry {
        amount: i64,
    }

    impl HistoryEntry for AddEntry {
        type Target = i64;

        fn undo(&mut self, target: &mut i64) {
            *target -= self.amount;
        }

        fn redo(&mut self, target: &mut i64) {
            *target += self.amount;
        }

        fn description(&self) -> &str {
            "Add"
        }

        fn icon(&self) -> &'static str {
            "add"
        }

        fn has_changes(&self) -> bool {
            self.amount != 0
        }
    }

    fn apply(stack: &mut UnifiedHistoryStack<AddEntry>, value: &mut i64, amount: i64) {
        *value += amount;
        stack.push(AddEntry { amount });
    }

    fn filled(count: i64) -> (UnifiedHistoryStack<AddEntry>, i64) {
        let mut stack = UnifiedHistoryStack::new(HistoryConfig::unbounded());
        let mut value = 0;
        for i in 1..=count {
            apply(&mut stack, &mut value, i);
        }
        (stack, value)
    }

    #[test]
    fn test_undo_redo_basic() {
        let (mut stack, mut value) = filled(2);
        assert_eq!(value, 3);

        assert!(stack.undo(&mut value));
        assert_eq!(value, 1);
        assert!(stack.can_redo());

        assert!(stack.redo(&mut value));
        assert_eq!(value, 3);
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_empty_stack_returns_false() {
        let mut stack: UnifiedHistoryStack<AddEntry> = UnifiedHistoryStack::default();
        let mut value = 0;
        assert!(!stack.undo(&mut value));
        assert!(!stack.redo(&mut value));
        assert_eq!(value, 0);
    }

    #[test]
    fn test_push_without_changes_is_discarded() {
        let (mut stack, _) = filled(1);
        stack.push(AddEntry { amount: 0 });
        assert_eq!(stack.undo_count(), 1);
    }

    #[test]
    fn test_push_clears_redo() {
        let (mut stack, mut value) = filled(3);
        stack.undo(&mut value);
        stack.undo(&mut value);
        assert_eq!(stack.redo_count(), 2);

        apply(&mut stack, &mut value, 10);
        assert_eq!(stack.redo_count(), 0);
        assert_eq!(stack.undo_count(), 2);
    }

    #[test]
    fn test_dirty_tracking_never_saved() {
        let mut stack: UnifiedHistoryStack<AddEntry> = UnifiedHistoryStack::default();
        let mut value = 0;
        assert!(!stack.is_dirty());
        apply(&mut stack, &mut value, 1);
        assert!(stack.is_dirty());
        stack.undo(&mut value);
        assert!(!stack.is_dirty());
    }

    #[test]
    fn test_dirty_tracking_returns_clean_at_saved_depth() {
        let (mut stack, mut value) = filled(2);
        stack.mark_saved();
        assert!(!stack.is_dirty());

        apply(&mut stack, &mut value, 5);
        assert!(stack.is_dirty());

        stack.undo(&mut value);
        assert!(!stack.is_dirty());
        assert!(stack.can_redo());

        stack.undo(&mut value);
        assert!(stack.is_dirty());
    }

    #[test]
    fn test_saved_state_discarded_by_push_stays_dirty() {
        let (mut stack, mut value) = filled(2);
        stack.mark_saved();
        stack.undo(&mut value);
        apply(&mut stack, &mut value, 7);
        // Same depth as the save point, different content
        assert_eq!(stack.undo_count(), 2);
        assert!(stack.is_dirty());
    }

    #[test]
    fn test_jump_to_matches_sequential_steps() {
        let (mut jumped, mut jumped_value) = filled(5);
        let (mut stepped, mut stepped_value) = filled(5);

        assert_eq!(jumped.jump_to(2, &mut jumped_value), 2);
        for _ in 0..3 {
            stepped.undo(&mut stepped_value);
        }
        assert_eq!(jumped_value, stepped_value);

        assert_eq!(jumped.jump_to(4, &mut jumped_value), 4);
        for _ in 0..2 {
            stepped.redo(&mut stepped_value);
        }
        assert_eq!(jumped_value, stepped_value);
        assert_eq!(jumped.timeline(), stepped.timeline());
    }

    #[test]
    fn test_jump_to_clamps() {
        let (mut stack, mut value) = filled(3);
        stack.jump_to(0, &mut value);
        assert_eq!(value, 0);
        assert_eq!(stack.jump_to(99, &mut value), 3);
        assert_eq!(value, 6);
    }

    #[test]
    fn test_jump_emits_single_event() {
        let (mut stack, mut value) = filled(4);
        let rx = stack.subscribe();
        stack.jump_to(0, &mut value);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![HistoryEvent::Jumped]);

        stack.jump_to(0, &mut value);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_timeline_is_chronological() {
        let (mut stack, mut value) = filled(3);
        stack.undo(&mut value);
        let timeline = stack.timeline();
        assert_eq!(timeline.len(), 3);
        assert_eq!(
            timeline.iter().map(|t| t.applied).collect::<Vec<_>>(),
            vec![true, true, false]
        );

        stack.undo(&mut value);
        // Redo order: next to redo first
        let redo_amounts: Vec<i64> = stack.redo_entries().map(|e| e.amount).collect();
        assert_eq!(redo_amounts, vec![2, 3]);
    }

    #[test]
    fn test_depth_limit_evicts_oldest() {
        let config = HistoryConfig {
            max_history_depth: 3,
            ..HistoryConfig::unbounded()
        };
        let mut stack = UnifiedHistoryStack::new(config);
        let mut value = 0;
        for i in 1..=5 {
            apply(&mut stack, &mut value, i);
        }
        assert_eq!(stack.undo_count(), 3);
        let remaining: Vec<i64> = stack.undo_entries().map(|e| e.amount).collect();
        assert_eq!(remaining, vec![3, 4, 5]);
    }

    #[test]
    fn test_eviction_below_save_point_marks_unreachable() {
        let config = HistoryConfig {
            max_history_depth: 2,
            ..HistoryConfig::unbounded()
        };
        let mut stack = UnifiedHistoryStack::new(config);
        let mut value = 0;
        stack.mark_saved();
        for i in 1..=3 {
            apply(&mut stack, &mut value, i);
        }
        stack.jump_to(0, &mut value);
        assert!(stack.is_dirty());
    }

    #[test]
    fn test_events_for_push_undo_redo() {
        let mut stack = UnifiedHistoryStack::new(HistoryConfig::unbounded());
        let rx = stack.subscribe();
        let mut value = 0;
        apply(&mut stack, &mut value, 1);
        stack.undo(&mut value);
        stack.redo(&mut value);
        stack.undo(&mut value);
        stack.undo(&mut value);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![HistoryEvent::Pushed, HistoryEvent::Undone, HistoryEvent::Redone, HistoryEvent::Undone]
        );
    }

    #[test]
    fn test_clear_resets_save_point() {
        let (mut stack, _) = filled(2);
        stack.mark_saved();
        stack.clear();
        assert!(stack.is_empty());
        assert!(!stack.is_dirty());
    }
}
