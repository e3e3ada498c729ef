/// Editing core of a layered, tile-sharing pixel document.
///
/// A `CanvasDocument` owns a layer tree of raster layers, folders and
/// reference overlays, a catalog of shared tiles, a selection, and a unified
/// undo/redo history. Cells of a raster layer can map to a tile; editing the
/// tile repaints every cell that maps it, and undo restores all of them.
pub mod composite;
pub mod document;
pub mod error;
pub mod history;
pub mod layer;
pub mod mapping;
pub mod persist;
pub mod selection;
pub mod surface;
pub mod tiles;
pub mod tree;

pub use document::{CanvasDocument, DocumentEvent, DocumentState};
pub use error::DocumentError;
pub use history::{HistoryItem, TilePosition};
pub use layer::{
    BlendMode, LayerBase, LayerEffect, LayerFolder, LayerId, LayerMask, LayerNode,
    LayerProperties, RasterLayer, ReferenceLayer,
};
pub use mapping::TileMapping;
pub use persist::{DocumentRecord, LayerRecord, MappingEntry, TileRecord};
pub use selection::{FloatingSelection, SelectionMask, TransformParams};
pub use surface::{PixelSurface, Rect};
pub use tiles::{TileDefinition, TileId, TileSet, TileSetEvent};
pub use tree::{LayerTree, TreePosition};
