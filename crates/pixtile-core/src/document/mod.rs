//! Canvas document: layer tree, tile catalog, selection and history.
//!
//! A `CanvasDocument` performs every edit by building the matching
//! `HistoryItem`, replaying it forward against its `DocumentState`, and
//! pushing it onto the history stack. Undo and redo replay the same items,
//! so an edit and its redo take the same code path. Structural operations
//! are in the `structure` submodule, pixel and tile operations in `pixels`,
//! and selection and resize in `canvas`.

mod canvas;
mod pixels;
mod state;
mod structure;

use std::sync::mpsc::Receiver;

use anyhow::Context;
use pixtile_config::EditorConfig;
use pixtile_mod_history::{
    EventBus, HistoryConfig, HistoryEntry, HistoryEvent, TempDirOffloadStore, TimelineEntry,
    UnifiedHistoryStack,
};

use crate::error::DocumentError;
use crate::history::HistoryItem;
use crate::layer::{LayerId, LayerNode, RasterLayer};
use crate::selection::{FloatingSelection, SelectionMask};
use crate::surface::PixelSurface;
use crate::tiles::{TileSet, TileSetEvent};
use crate::tree::LayerTree;

pub use state::DocumentState;

/// Document change notification.
///
/// Structural edits always emit `BeforeStructureChanged`, then
/// `StructureChanged`, then `LayersChanged`, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    BeforeStructureChanged,
    StructureChanged,
    LayersChanged,
    ActiveLayerChanged(Option<LayerId>),
    PixelsChanged(LayerId),
    SelectionChanged,
    CanvasResized { width: u32, height: u32 },
    TileSetChanged(TileSetEvent),
}

/// A layered, tile-sharing pixel document with unified undo/redo.
pub struct CanvasDocument {
    pub(crate) state: DocumentState,
    history: UnifiedHistoryStack<HistoryItem>,
    events: EventBus<DocumentEvent>,
    pub(crate) tile_events: Receiver<TileSetEvent>,
    pub(crate) next_layer_id: u64,
    default_fill: [u8; 4],
}

impl std::fmt::Debug for CanvasDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasDocument")
            .field("state", &self.state)
            .field("history", &self.history)
            .field("next_layer_id", &self.next_layer_id)
            .finish_non_exhaustive()
    }
}

impl CanvasDocument {
    /// Creates a document with one transparent raster layer, which is active.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` if the canvas or tile size is zero.
    pub fn new(
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self, DocumentError> {
        let mut doc = Self::empty(width, height, tile_width, tile_height)?;
        doc.add_initial_layer();
        Ok(doc)
    }

    /// Creates a document without layers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` if the canvas or tile size is zero.
    pub fn empty(
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self, DocumentError> {
        if width == 0 || height == 0 {
            return Err(DocumentError::InvalidDimensions { width, height });
        }
        let mut tiles = TileSet::new(tile_width, tile_height)?;
        let tile_events = tiles.subscribe();
        Ok(Self {
            state: DocumentState::new(width, height, tiles),
            history: UnifiedHistoryStack::new(HistoryConfig::default()),
            events: EventBus::new(),
            tile_events,
            next_layer_id: 1,
            default_fill: [0, 0, 0, 0],
        })
    }

    /// Creates a document sized and filled per `config`, with its history
    /// limits and, when enabled, an offload store in the configured directory.
    /// Failing to create the offload store only disables offloading.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured canvas or tile size is invalid.
    pub fn from_config(config: &EditorConfig) -> anyhow::Result<Self> {
        let mut doc = Self::empty(
            config.canvas_width,
            config.canvas_height,
            config.tile_width,
            config.tile_height,
        )
        .context("Invalid canvas settings")?;
        doc.default_fill = config.default_layer_fill.to_bgra();
        doc.history = history_from_config(config);
        doc.add_initial_layer();
        Ok(doc)
    }

    /// Replaces the (empty) history stack, e.g. to attach an offload store.
    pub fn with_history(mut self, history: UnifiedHistoryStack<HistoryItem>) -> Self {
        self.history = history;
        self
    }

    /// Color new raster layers start with.
    pub fn set_default_fill(&mut self, bgra: [u8; 4]) {
        self.default_fill = bgra;
    }

    fn add_initial_layer(&mut self) {
        let id = self.allocate_id();
        let layer = RasterLayer::new(id, format!("Layer {}", id.0), self.blank_surface());
        if let Err(e) = self.state.tree.insert(None, 0, LayerNode::Raster(layer)) {
            tracing::warn!("Failed to add initial layer: {e}");
            return;
        }
        self.state.active = Some(id);
        self.state.composite_stale = true;
    }

    pub(crate) fn allocate_id(&mut self) -> LayerId {
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        id
    }

    pub(crate) fn blank_surface(&self) -> PixelSurface {
        PixelSurface::filled(self.state.width, self.state.height, self.default_fill)
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn width(&self) -> u32 {
        self.state.width
    }

    pub fn height(&self) -> u32 {
        self.state.height
    }

    /// (tile width, tile height)
    pub fn tile_size(&self) -> (u32, u32) {
        (self.state.tiles.tile_width(), self.state.tiles.tile_height())
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn tree(&self) -> &LayerTree {
        &self.state.tree
    }

    pub fn tiles(&self) -> &TileSet {
        &self.state.tiles
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerNode> {
        self.state.tree.find(id)
    }

    /// # Errors
    ///
    /// Returns `LayerNotFound` or `NotARasterLayer`.
    pub fn raster(&self, id: LayerId) -> Result<&RasterLayer, DocumentError> {
        self.state.tree.raster(id)
    }

    /// Every node depth-first, bottom to top.
    pub fn flattened(&self) -> Vec<&LayerNode> {
        self.state.tree.flatten()
    }

    pub fn active_layer(&self) -> Option<LayerId> {
        self.state.active
    }

    pub fn selection(&self) -> &SelectionMask {
        &self.state.selection
    }

    pub fn floating_selection(&self) -> &FloatingSelection {
        &self.state.floating
    }

    pub fn effective_visible(&self, id: LayerId) -> bool {
        self.state.tree.effective_visible(id)
    }

    pub fn effective_locked(&self, id: LayerId) -> bool {
        self.state.tree.effective_locked(id)
    }

    pub fn history(&self) -> &UnifiedHistoryStack<HistoryItem> {
        &self.history
    }

    /// Subscribes to document changes.
    pub fn subscribe(&mut self) -> Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    /// Subscribes to history stack changes.
    pub fn subscribe_history(&mut self) -> Receiver<HistoryEvent> {
        self.history.subscribe()
    }

    /// The composite of every visible raster layer, rebuilt if stale.
    pub fn composite(&mut self) -> &PixelSurface {
        if self.state.composite_stale {
            self.state.recomposite();
        }
        &self.state.composite
    }

    /// Rebuilds the composite unconditionally.
    pub fn recomposite(&mut self) {
        self.state.recomposite();
    }

    // ── History ────────────────────────────────────────────────────────

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Undoes the last edit. Returns false if there is nothing to undo or
    /// its offloaded data could not be read back.
    pub fn undo(&mut self) -> bool {
        let undone = self.history.undo(&mut self.state);
        self.after_replay();
        undone
    }

    /// Redoes the last undone edit. Returns false if there is nothing to redo
    /// or its offloaded data could not be read back.
    pub fn redo(&mut self) -> bool {
        let redone = self.history.redo(&mut self.state);
        self.after_replay();
        redone
    }

    /// Undoes or redoes until `depth` edits are applied. Returns the depth reached.
    pub fn jump_to(&mut self, depth: usize) -> usize {
        let reached = self.history.jump_to(depth, &mut self.state);
        self.after_replay();
        reached
    }

    pub fn mark_saved(&mut self) {
        self.history.mark_saved();
    }

    pub fn is_dirty(&self) -> bool {
        self.history.is_dirty()
    }

    pub fn timeline(&self) -> Vec<TimelineEntry> {
        self.history.timeline()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.history.undo_description()
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.history.redo_description()
    }

    /// Drops all history. The document content is unchanged.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // ── Plumbing ───────────────────────────────────────────────────────

    /// Applies `item` and records it. Items without changes are dropped
    /// untouched. Returns whether anything was recorded.
    pub(crate) fn commit(&mut self, mut item: HistoryItem) -> bool {
        if !item.has_changes() {
            return false;
        }
        tracing::debug!("Applying '{}'", item.description());
        item.redo(&mut self.state);
        self.state.repair_active();
        self.flush_events();
        self.history.push(item);
        true
    }

    fn after_replay(&mut self) {
        self.state.repair_active();
        self.flush_events();
    }

    /// Forwards queued catalog events, then queued document events.
    pub(crate) fn flush_events(&mut self) {
        let tile_events: Vec<TileSetEvent> = self.tile_events.try_iter().collect();
        for event in tile_events {
            self.events.emit(DocumentEvent::TileSetChanged(event));
        }
        for event in std::mem::take(&mut self.state.pending) {
            self.events.emit(event);
        }
    }
}

fn history_from_config(config: &EditorConfig) -> UnifiedHistoryStack<HistoryItem> {
    let limits = HistoryConfig::from(config);
    if !config.offload_enabled {
        return UnifiedHistoryStack::new(limits);
    }
    let store = match config.offload_root() {
        Some(root) => TempDirOffloadStore::new_in(&root),
        None => TempDirOffloadStore::new(),
    };
    match store {
        Ok(store) => UnifiedHistoryStack::with_offload(limits, store),
        Err(e) => {
            tracing::warn!("History offloading disabled: {e:#}");
            UnifiedHistoryStack::new(limits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_one_active_layer() {
        let doc = CanvasDocument::new(8, 8, 4, 4).expect("doc");
        assert_eq!(doc.tree().roots().len(), 1);
        assert_eq!(doc.active_layer(), Some(LayerId(1)));
        assert!(!doc.can_undo());
        assert!(!doc.is_dirty());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert_eq!(
            CanvasDocument::new(0, 8, 4, 4).unwrap_err(),
            DocumentError::InvalidDimensions { width: 0, height: 8 }
        );
        assert!(CanvasDocument::new(8, 8, 0, 4).is_err());
    }

    #[test]
    fn test_from_config_uses_fill_and_limits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EditorConfig {
            canvas_width: 4,
            canvas_height: 2,
            default_layer_fill: pixtile_config::HexColor::rgb(255, 0, 0),
            max_history_depth: 3,
            offload_dir: dir.path().to_string_lossy().into_owned(),
            ..EditorConfig::default()
        };

        let doc = CanvasDocument::from_config(&config).expect("doc");
        assert_eq!((doc.width(), doc.height()), (4, 2));
        assert_eq!(doc.history().config().max_history_depth, 3);
        let layer = doc.raster(LayerId(1)).expect("layer");
        assert_eq!(layer.surface.read_at(0).to_le_bytes(), [0, 0, 255, 255]);
    }

    #[test]
    fn test_composite_is_rebuilt_lazily() {
        let mut doc = CanvasDocument::new(2, 2, 2, 2).expect("doc");
        doc.set_default_fill([1, 2, 3, 255]);
        doc.add_layer(None);
        assert_eq!(doc.composite().pixel(1, 1), Some(u32::from_le_bytes([1, 2, 3, 255])));
    }
}
