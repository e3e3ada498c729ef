//! Sparse pixel deltas and the pixel-delta history item.

use pixtile_mod_history::{Offloadable, OffloadService};
use serde::{Deserialize, Serialize};

use crate::document::DocumentState;
use crate::layer::LayerId;
use crate::surface::{PixelSurface, BYTES_PER_PIXEL};

/// Parallel lists of (byte offset, before, after) for changed pixels only.
///
/// Offsets address the first byte of a BGRA pixel in a layer surface.
/// Values are packed pixels compared with exact integer equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelDeltas {
    offsets: Vec<usize>,
    before: Vec<u32>,
    after: Vec<u32>,
}

impl PixelDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds deltas from parallel lists; `None` if their lengths differ.
    pub fn from_parts(offsets: Vec<usize>, before: Vec<u32>, after: Vec<u32>) -> Option<Self> {
        (offsets.len() == before.len() && before.len() == after.len()).then_some(Self {
            offsets,
            before,
            after,
        })
    }

    /// Diffs two equally sized BGRA buffers.
    pub fn capture(before: &[u8], after: &[u8]) -> Self {
        let mut deltas = Self::new();
        let pairs = before
            .chunks_exact(BYTES_PER_PIXEL)
            .zip(after.chunks_exact(BYTES_PER_PIXEL));
        for (i, (b, a)) in pairs.enumerate() {
            let b = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            let a = u32::from_le_bytes([a[0], a[1], a[2], a[3]]);
            deltas.record(i * BYTES_PER_PIXEL, b, a);
        }
        deltas
    }

    /// Records one pixel; identical values are skipped.
    pub fn record(&mut self, offset: usize, before: u32, after: u32) {
        if before != after {
            self.offsets.push(offset);
            self.before.push(before);
            self.after.push(after);
        }
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn before(&self) -> &[u32] {
        &self.before
    }

    pub fn after(&self) -> &[u32] {
        &self.after
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn estimated_bytes(&self) -> usize {
        self.len() * (std::mem::size_of::<usize>() + 2 * std::mem::size_of::<u32>())
    }

    pub fn apply_before(&self, surface: &mut PixelSurface) {
        for (offset, value) in self.offsets.iter().zip(&self.before) {
            surface.write_at(*offset, *value);
        }
    }

    pub fn apply_after(&self, surface: &mut PixelSurface) {
        for (offset, value) in self.offsets.iter().zip(&self.after) {
            surface.write_at(*offset, *value);
        }
    }
}

/// Pixel edit on one raster layer outside any tile-mapped cell.
#[derive(Debug)]
pub struct PixelDeltaItem {
    layer: LayerId,
    deltas: Offloadable<PixelDeltas>,
    changed: bool,
    estimated: usize,
}

impl PixelDeltaItem {
    pub fn new(layer: LayerId, deltas: PixelDeltas) -> Self {
        Self {
            layer,
            changed: !deltas.is_empty(),
            estimated: deltas.estimated_bytes(),
            deltas: Offloadable::new(deltas),
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// The deltas, or `None` while offloaded.
    pub fn deltas(&self) -> Option<&PixelDeltas> {
        self.deltas.get()
    }

    pub fn has_changes(&self) -> bool {
        self.changed
    }

    pub fn estimated_bytes(&self) -> usize {
        self.estimated
    }

    pub fn is_offloaded(&self) -> bool {
        self.deltas.is_offloaded()
    }

    pub fn offload(&mut self, service: &dyn OffloadService) -> bool {
        self.deltas.offload(service)
    }

    pub fn reload(&mut self, service: &dyn OffloadService) -> bool {
        self.deltas.reload(service)
    }

    pub fn discard(&mut self, service: &dyn OffloadService) {
        self.deltas.discard(service);
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        self.replay(state, false);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        self.replay(state, true);
    }

    fn replay(&self, state: &mut DocumentState, forward: bool) {
        let Some(deltas) = self.deltas.get() else {
            panic!("pixel delta on {} replayed while offloaded", self.layer);
        };
        let Ok(layer) = state.tree.raster_mut(self.layer) else {
            tracing::warn!("Pixel delta target {} is gone, skipping", self.layer);
            return;
        };
        if forward {
            deltas.apply_after(&mut layer.surface);
        } else {
            deltas.apply_before(&mut layer.surface);
        }
        state.pixels_changed(self.layer);
    }
}
