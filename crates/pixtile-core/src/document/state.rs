//! Replayable document state.
//!
//! Everything a history item can touch lives here, apart from the history
//! stack itself, so the document can lend `&mut DocumentState` to the stack
//! while it owns both.

use crate::composite::{composite_onto, CompositeSource};
use crate::document::DocumentEvent;
use crate::history::tile::TilePosition;
use crate::layer::LayerId;
use crate::mapping::TileMapping;
use crate::selection::{FloatingSelection, SelectionMask};
use crate::surface::PixelSurface;
use crate::tiles::{TileId, TileSet};
use crate::tree::LayerTree;

/// Canvas size, layer tree, tile catalog, selection and composite.
pub struct DocumentState {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) tree: LayerTree,
    pub(crate) tiles: TileSet,
    pub(crate) selection: SelectionMask,
    pub(crate) floating: FloatingSelection,
    pub(crate) active: Option<LayerId>,
    pub(crate) composite: PixelSurface,
    pub(crate) composite_stale: bool,
    /// Events raised while mutating, flushed by the document afterwards.
    pub(crate) pending: Vec<DocumentEvent>,
}

impl std::fmt::Debug for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentState")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layers", &self.tree.len())
            .field("tiles", &self.tiles.len())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl DocumentState {
    pub(crate) fn new(width: u32, height: u32, tiles: TileSet) -> Self {
        Self {
            width,
            height,
            tree: LayerTree::new(),
            tiles,
            selection: SelectionMask::new(width, height),
            floating: FloatingSelection::default(),
            active: None,
            composite: PixelSurface::new(width, height),
            composite_stale: true,
            pending: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tree(&self) -> &LayerTree {
        &self.tree
    }

    pub fn tiles(&self) -> &TileSet {
        &self.tiles
    }

    pub fn selection(&self) -> &SelectionMask {
        &self.selection
    }

    pub fn floating(&self) -> &FloatingSelection {
        &self.floating
    }

    pub fn active(&self) -> Option<LayerId> {
        self.active
    }

    pub(crate) fn notify(&mut self, event: DocumentEvent) {
        self.pending.push(event);
    }

    pub(crate) fn begin_structure(&mut self) {
        self.notify(DocumentEvent::BeforeStructureChanged);
    }

    pub(crate) fn end_structure(&mut self) {
        self.composite_stale = true;
        self.notify(DocumentEvent::StructureChanged);
        self.notify(DocumentEvent::LayersChanged);
    }

    pub(crate) fn layers_changed(&mut self) {
        self.composite_stale = true;
        self.notify(DocumentEvent::LayersChanged);
    }

    pub(crate) fn pixels_changed(&mut self, layer: LayerId) {
        self.composite_stale = true;
        if self.pending.last() != Some(&DocumentEvent::PixelsChanged(layer)) {
            self.notify(DocumentEvent::PixelsChanged(layer));
        }
    }

    /// Every raster cell mapped to `tile`, in draw order then row-major.
    pub fn tile_positions(&self, tile: TileId) -> Vec<TilePosition> {
        let mut out = Vec::new();
        for layer in self.tree.raster_layers() {
            let Some(mapping) = &layer.mapping else {
                continue;
            };
            for (column, row) in mapping.cells_with(tile) {
                out.push(TilePosition {
                    layer: layer.base.id,
                    column,
                    row,
                });
            }
        }
        out
    }

    /// Whether any raster layer maps `tile`.
    pub fn tile_in_use(&self, tile: TileId) -> bool {
        self.tree
            .raster_layers()
            .iter()
            .any(|l| l.mapping.as_ref().is_some_and(|m| m.references(tile)))
    }

    /// Paints `pixels` (one tile buffer) into the cell at `position`.
    /// Partial edge cells are clipped.
    pub(crate) fn repaint_cell(&mut self, position: TilePosition, pixels: &[u8]) {
        let (tile_width, tile_height) = (self.tiles.tile_width(), self.tiles.tile_height());
        let Ok(layer) = self.tree.raster_mut(position.layer) else {
            tracing::warn!("Skipping repaint of missing layer {}", position.layer);
            return;
        };
        let rect = TileMapping::cell_rect(position.column, position.row, tile_width, tile_height);
        layer.surface.write_rect(rect.x, rect.y, tile_width, pixels);
        self.pixels_changed(position.layer);
    }

    /// Moves the active cursor off a layer that left the tree: to the
    /// topmost raster layer, or the topmost node of any kind when there is
    /// no raster layer left.
    pub(crate) fn repair_active(&mut self) {
        let Some(id) = self.active else {
            return;
        };
        if self.tree.contains(id) {
            return;
        }
        let fallback = self
            .tree
            .raster_layers()
            .last()
            .map(|l| l.base.id)
            .or_else(|| self.tree.flatten().last().map(|n| n.id()));
        self.active = fallback;
        self.notify(DocumentEvent::ActiveLayerChanged(fallback));
    }

    /// Rebuilds the composite from every effectively visible raster layer.
    pub(crate) fn recomposite(&mut self) {
        let mut target = PixelSurface::new(self.width, self.height);
        let sources: Vec<CompositeSource<'_>> = self
            .tree
            .raster_layers()
            .into_iter()
            .filter(|l| self.tree.effective_visible(l.base.id))
            .map(CompositeSource::from_layer)
            .collect();
        composite_onto(&mut target, &sources);
        self.composite = target;
        self.composite_stale = false;
    }
}
