//! Selection history items.

use crate::document::{DocumentEvent, DocumentState};
use crate::selection::{FloatingSelection, SelectionMask};

/// Whole-mask selection change. Masks are compared pixel by pixel.
#[derive(Debug)]
pub struct SelectionChangeItem {
    before: SelectionMask,
    after: SelectionMask,
}

impl SelectionChangeItem {
    pub fn new(before: SelectionMask, after: SelectionMask) -> Self {
        Self { before, after }
    }

    pub fn has_changes(&self) -> bool {
        self.before != self.after
    }

    pub fn estimated_bytes(&self) -> usize {
        (self.before.width() as usize * self.before.height() as usize)
            + (self.after.width() as usize * self.after.height() as usize)
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        state.selection = self.before.clone();
        state.notify(DocumentEvent::SelectionChanged);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        state.selection = self.after.clone();
        state.notify(DocumentEvent::SelectionChanged);
    }
}

/// Floating selection transform.
///
/// Translation is stored as parameters alone. A scale or rotation bakes the
/// resampled pixels into the floating buffer on commit, so both buffers are
/// kept to get back to the unbaked state.
#[derive(Debug)]
pub struct SelectionTransformItem {
    before: FloatingSelection,
    after: FloatingSelection,
}

impl SelectionTransformItem {
    pub fn new(before: FloatingSelection, after: FloatingSelection) -> Self {
        Self { before, after }
    }

    pub fn has_changes(&self) -> bool {
        self.before != self.after
    }

    pub fn estimated_bytes(&self) -> usize {
        [&self.before, &self.after]
            .iter()
            .filter_map(|f| f.buffer.as_ref())
            .map(|b| b.bytes().len())
            .sum()
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        state.floating = self.before.clone();
        state.notify(DocumentEvent::SelectionChanged);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        state.floating = self.after.clone();
        state.notify(DocumentEvent::SelectionChanged);
    }
}
