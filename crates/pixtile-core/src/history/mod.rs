//! History items recorded by document operations.
//!
//! `HistoryItem` is a closed set: every undoable document edit is one of
//! these variants, and the stack replays them against `DocumentState`.

pub mod canvas;
pub mod pixel;
pub mod selection;
pub mod structure;
pub mod tile;

use pixtile_mod_history::{HistoryEntry, OffloadService};

use crate::document::DocumentState;

pub use canvas::{CanvasSnapshot, ResizeCanvasItem};
pub use pixel::{PixelDeltaItem, PixelDeltas};
pub use selection::{SelectionChangeItem, SelectionTransformItem};
pub use structure::{
    AddLayerItem, FlattenFolderItem, LayerPropertiesItem, MergeDownItem, MoveToFolderItem,
    RemoveFolderItem, RemoveLayerItem, ReorderLayerItem,
};
pub use tile::{
    LayerDeltas, MappingChange, RemoveTileItem, TileChange, TilePayload, TilePosition,
    TilePropagation,
};

/// One undoable document edit.
#[derive(Debug)]
pub enum HistoryItem {
    PixelDelta(PixelDeltaItem),
    /// A tile stamped into a cell, optionally writing the cell's mapping.
    TileStamp(TilePropagation),
    /// A tile definition edited directly and propagated to its cells.
    TileDefinitionEdit(TilePropagation),
    /// A pixel edit touching mapped and unmapped pixels.
    TileMixedEdit(TilePropagation),
    /// A tile deleted from the catalog while no layer mapped it.
    RemoveTile(RemoveTileItem),
    AddLayer(AddLayerItem),
    RemoveLayer(RemoveLayerItem),
    RemoveFolder(RemoveFolderItem),
    ReorderLayer(ReorderLayerItem),
    MoveToFolder(MoveToFolderItem),
    MergeDown(MergeDownItem),
    FlattenFolder(FlattenFolderItem),
    LayerProperties(LayerPropertiesItem),
    SelectionChange(SelectionChangeItem),
    SelectionTransform(SelectionTransformItem),
    ResizeCanvas(ResizeCanvasItem),
}

impl HistoryItem {
    fn tile(&self) -> Option<&TilePropagation> {
        match self {
            Self::TileStamp(t) | Self::TileDefinitionEdit(t) | Self::TileMixedEdit(t) => Some(t),
            _ => None,
        }
    }

    fn tile_mut(&mut self) -> Option<&mut TilePropagation> {
        match self {
            Self::TileStamp(t) | Self::TileDefinitionEdit(t) | Self::TileMixedEdit(t) => Some(t),
            _ => None,
        }
    }
}

impl HistoryEntry for HistoryItem {
    type Target = DocumentState;

    fn undo(&mut self, state: &mut DocumentState) {
        match self {
            Self::PixelDelta(item) => item.undo(state),
            Self::TileStamp(item) | Self::TileDefinitionEdit(item) | Self::TileMixedEdit(item) => {
                item.undo(state)
            }
            Self::RemoveTile(item) => item.undo(state),
            Self::AddLayer(item) => item.undo(state),
            Self::RemoveLayer(item) => item.undo(state),
            Self::RemoveFolder(item) => item.undo(state),
            Self::ReorderLayer(item) => item.undo(state),
            Self::MoveToFolder(item) => item.undo(state),
            Self::MergeDown(item) => item.undo(state),
            Self::FlattenFolder(item) => item.undo(state),
            Self::LayerProperties(item) => item.undo(state),
            Self::SelectionChange(item) => item.undo(state),
            Self::SelectionTransform(item) => item.undo(state),
            Self::ResizeCanvas(item) => item.undo(state),
        }
    }

    fn redo(&mut self, state: &mut DocumentState) {
        match self {
            Self::PixelDelta(item) => item.redo(state),
            Self::TileStamp(item) | Self::TileDefinitionEdit(item) | Self::TileMixedEdit(item) => {
                item.redo(state)
            }
            Self::RemoveTile(item) => item.redo(state),
            Self::AddLayer(item) => item.redo(state),
            Self::RemoveLayer(item) => item.redo(state),
            Self::RemoveFolder(item) => item.redo(state),
            Self::ReorderLayer(item) => item.redo(state),
            Self::MoveToFolder(item) => item.redo(state),
            Self::MergeDown(item) => item.redo(state),
            Self::FlattenFolder(item) => item.redo(state),
            Self::LayerProperties(item) => item.redo(state),
            Self::SelectionChange(item) => item.redo(state),
            Self::SelectionTransform(item) => item.redo(state),
            Self::ResizeCanvas(item) => item.redo(state),
        }
    }

    fn description(&self) -> &str {
        match self {
            Self::PixelDelta(_) => "Paint",
            Self::TileStamp(item) | Self::TileDefinitionEdit(item) | Self::TileMixedEdit(item) => {
                item.description()
            }
            Self::RemoveTile(_) => "Remove Tile",
            Self::AddLayer(item) => item.description(),
            Self::RemoveLayer(_) => "Remove Layer",
            Self::RemoveFolder(_) => "Remove Folder",
            Self::ReorderLayer(_) => "Reorder Layer",
            Self::MoveToFolder(_) => "Move to Folder",
            Self::MergeDown(_) => "Merge Down",
            Self::FlattenFolder(_) => "Flatten Folder",
            Self::LayerProperties(_) => "Layer Properties",
            Self::SelectionChange(_) => "Change Selection",
            Self::SelectionTransform(_) => "Transform Selection",
            Self::ResizeCanvas(_) => "Resize Canvas",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Self::PixelDelta(_) => "pixels",
            Self::TileStamp(_) => "tile-stamp",
            Self::TileDefinitionEdit(_) => "tile-edit",
            Self::TileMixedEdit(_) => "tile-mixed",
            Self::RemoveTile(_) => "tile-remove",
            Self::AddLayer(_) => "layer-add",
            Self::RemoveLayer(_) => "layer-remove",
            Self::RemoveFolder(_) => "folder-remove",
            Self::ReorderLayer(_) => "layer-reorder",
            Self::MoveToFolder(_) => "layer-move",
            Self::MergeDown(_) => "layer-merge",
            Self::FlattenFolder(_) => "folder-flatten",
            Self::LayerProperties(_) => "layer-properties",
            Self::SelectionChange(_) => "selection",
            Self::SelectionTransform(_) => "selection-transform",
            Self::ResizeCanvas(_) => "canvas-resize",
        }
    }

    fn has_changes(&self) -> bool {
        match self {
            Self::PixelDelta(item) => item.has_changes(),
            Self::TileStamp(item) | Self::TileDefinitionEdit(item) | Self::TileMixedEdit(item) => {
                item.has_changes()
            }
            Self::RemoveTile(_)
            | Self::AddLayer(_)
            | Self::RemoveLayer(_)
            | Self::RemoveFolder(_)
            | Self::MergeDown(_)
            | Self::FlattenFolder(_) => true,
            Self::ReorderLayer(item) => item.has_changes(),
            Self::MoveToFolder(item) => item.has_changes(),
            Self::LayerProperties(item) => item.has_changes(),
            Self::SelectionChange(item) => item.has_changes(),
            Self::SelectionTransform(item) => item.has_changes(),
            Self::ResizeCanvas(item) => item.has_changes(),
        }
    }

    fn estimated_bytes(&self) -> usize {
        match self {
            Self::PixelDelta(item) => item.estimated_bytes(),
            Self::TileStamp(item) | Self::TileDefinitionEdit(item) | Self::TileMixedEdit(item) => {
                item.estimated_bytes()
            }
            Self::AddLayer(item) => item.estimated_bytes(),
            Self::RemoveLayer(item) => item.estimated_bytes(),
            Self::MergeDown(item) => item.estimated_bytes(),
            Self::FlattenFolder(item) => item.estimated_bytes(),
            Self::SelectionChange(item) => item.estimated_bytes(),
            Self::SelectionTransform(item) => item.estimated_bytes(),
            Self::ResizeCanvas(item) => item.estimated_bytes(),
            // one tile or a folder shell: small, and never offloaded
            Self::RemoveTile(_)
            | Self::RemoveFolder(_)
            | Self::ReorderLayer(_)
            | Self::MoveToFolder(_)
            | Self::LayerProperties(_) => 0,
        }
    }

    fn is_offloaded(&self) -> bool {
        match self {
            Self::PixelDelta(item) => item.is_offloaded(),
            Self::ResizeCanvas(item) => item.is_offloaded(),
            Self::AddLayer(item) => item.is_offloaded(),
            Self::RemoveLayer(item) => item.is_offloaded(),
            Self::MergeDown(item) => item.is_offloaded(),
            Self::FlattenFolder(item) => item.is_offloaded(),
            other => other.tile().is_some_and(TilePropagation::is_offloaded),
        }
    }

    fn offload(&mut self, service: &dyn OffloadService) -> bool {
        match self {
            Self::PixelDelta(item) => item.offload(service),
            Self::ResizeCanvas(item) => item.offload(service),
            Self::AddLayer(item) => item.offload(service),
            Self::RemoveLayer(item) => item.offload(service),
            Self::MergeDown(item) => item.offload(service),
            Self::FlattenFolder(item) => item.offload(service),
            other => other.tile_mut().is_some_and(|t| t.offload(service)),
        }
    }

    fn reload(&mut self, service: &dyn OffloadService) -> bool {
        match self {
            Self::PixelDelta(item) => item.reload(service),
            Self::ResizeCanvas(item) => item.reload(service),
            Self::AddLayer(item) => item.reload(service),
            Self::RemoveLayer(item) => item.reload(service),
            Self::MergeDown(item) => item.reload(service),
            Self::FlattenFolder(item) => item.reload(service),
            other => other.tile_mut().map_or(true, |t| t.reload(service)),
        }
    }

    fn discard(&mut self, service: &dyn OffloadService) {
        match self {
            Self::PixelDelta(item) => item.discard(service),
            Self::ResizeCanvas(item) => item.discard(service),
            Self::AddLayer(item) => item.discard(service),
            Self::RemoveLayer(item) => item.discard(service),
            Self::MergeDown(item) => item.discard(service),
            Self::FlattenFolder(item) => item.discard(service),
            other => {
                if let Some(tile) = other.tile_mut() {
                    tile.discard(service);
                }
            }
        }
    }
}
