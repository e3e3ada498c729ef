//! Tile propagation: tile definition changes replayed onto every mapped cell.
//!
//! A propagation captures three things at the moment of the edit: direct
//! pixel deltas outside mapped cells, the before/after pixels of each edited
//! tile, and every `(layer, column, row)` that referenced each edited tile.
//! Replay runs in two phases. The catalog is updated first, then every
//! captured cell is repainted from the buffer just written to the catalog.
//! Direct deltas and mapping writes are applied last.

use pixtile_mod_history::{Offloadable, OffloadService};
use serde::{Deserialize, Serialize};

use crate::document::DocumentState;
use crate::history::pixel::PixelDeltas;
use crate::layer::LayerId;
use crate::mapping::TileMapping;
use crate::tiles::TileId;

/// One mapped cell on one raster layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePosition {
    pub layer: LayerId,
    pub column: u32,
    pub row: u32,
}

/// Before/after pixels of one tile plus every cell that showed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileChange {
    pub tile: TileId,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    pub positions: Vec<TilePosition>,
}

impl TileChange {
    fn side(&self, forward: bool) -> &[u8] {
        if forward {
            &self.after
        } else {
            &self.before
        }
    }
}

/// A mapping cell write. `created` marks a write that also had to give the
/// layer its mapping grid; undo drops the grid again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingChange {
    pub position: TilePosition,
    pub before: Option<TileId>,
    pub after: Option<TileId>,
    pub created: bool,
}

/// Direct pixel deltas for one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDeltas {
    pub layer: LayerId,
    pub deltas: PixelDeltas,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePayload {
    pub direct: Vec<LayerDeltas>,
    pub tiles: Vec<TileChange>,
    pub mappings: Vec<MappingChange>,
}

impl TilePayload {
    fn has_changes(&self) -> bool {
        self.direct.iter().any(|d| !d.deltas.is_empty())
            || self.tiles.iter().any(|t| t.before != t.after)
            || self.mappings.iter().any(|m| m.before != m.after || m.created)
    }

    fn estimated_bytes(&self) -> usize {
        let direct: usize = self.direct.iter().map(|d| d.deltas.estimated_bytes()).sum();
        let tiles: usize = self
            .tiles
            .iter()
            .map(|t| t.before.len() + t.after.len() + t.positions.len() * 16)
            .sum();
        direct + tiles + self.mappings.len() * 32
    }
}

/// Shared state of the three tile history items.
#[derive(Debug)]
pub struct TilePropagation {
    description: String,
    payload: Offloadable<TilePayload>,
    changed: bool,
    estimated: usize,
}

impl TilePropagation {
    pub fn new(description: impl Into<String>, payload: TilePayload) -> Self {
        Self {
            description: description.into(),
            changed: payload.has_changes(),
            estimated: payload.estimated_bytes(),
            payload: Offloadable::new(payload),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The captured payload, or `None` while offloaded.
    pub fn payload(&self) -> Option<&TilePayload> {
        self.payload.get()
    }

    pub fn has_changes(&self) -> bool {
        self.changed
    }

    pub fn estimated_bytes(&self) -> usize {
        self.estimated
    }

    pub fn is_offloaded(&self) -> bool {
        self.payload.is_offloaded()
    }

    pub fn offload(&mut self, service: &dyn OffloadService) -> bool {
        self.payload.offload(service)
    }

    pub fn reload(&mut self, service: &dyn OffloadService) -> bool {
        self.payload.reload(service)
    }

    pub fn discard(&mut self, service: &dyn OffloadService) {
        self.payload.discard(service);
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        self.replay(state, false);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        self.replay(state, true);
    }

    fn replay(&self, state: &mut DocumentState, forward: bool) {
        let Some(payload) = self.payload.get() else {
            panic!("'{}' replayed while offloaded", self.description);
        };

        // Phase 1: the catalog
        for change in &payload.tiles {
            if let Err(e) = state.tiles.update(change.tile, change.side(forward)) {
                tracing::warn!("Failed to restore tile {}: {e}", change.tile);
            }
        }

        // Phase 2: every cell that referenced the tile
        for change in &payload.tiles {
            for position in &change.positions {
                state.repaint_cell(*position, change.side(forward));
            }
        }

        if forward {
            for mapping in &payload.mappings {
                write_mapping(state, mapping, true);
            }
            for direct in &payload.direct {
                apply_direct(state, direct, true);
            }
        } else {
            for direct in payload.direct.iter().rev() {
                apply_direct(state, direct, false);
            }
            for mapping in payload.mappings.iter().rev() {
                write_mapping(state, mapping, false);
            }
        }
    }
}

fn apply_direct(state: &mut DocumentState, direct: &LayerDeltas, forward: bool) {
    let Ok(layer) = state.tree.raster_mut(direct.layer) else {
        tracing::warn!("Direct delta target {} is gone, skipping", direct.layer);
        return;
    };
    if forward {
        direct.deltas.apply_after(&mut layer.surface);
    } else {
        direct.deltas.apply_before(&mut layer.surface);
    }
    state.pixels_changed(direct.layer);
}

fn write_mapping(state: &mut DocumentState, change: &MappingChange, forward: bool) {
    let (tile_width, tile_height) = (state.tiles.tile_width(), state.tiles.tile_height());
    let position = change.position;
    let Ok(layer) = state.tree.raster_mut(position.layer) else {
        tracing::warn!("Mapping target {} is gone, skipping", position.layer);
        return;
    };
    let (width, height) = (layer.surface.width(), layer.surface.height());
    let mapping = layer
        .mapping
        .get_or_insert_with(|| TileMapping::for_layer(width, height, tile_width, tile_height));
    let value = if forward { change.after } else { change.before };
    if let Err(e) = mapping.set(position.column, position.row, value) {
        tracing::warn!("Failed to write mapping on {}: {e}", position.layer);
    }
    if !forward && change.created {
        layer.mapping = None;
    }
    state.layers_changed();
}

/// A tile taken out of the catalog. Undo puts the definition back under its
/// old id, so older history entries that map the tile still find it.
#[derive(Debug)]
pub struct RemoveTileItem {
    tile: TileId,
    pixels: Vec<u8>,
}

impl RemoveTileItem {
    pub fn new(tile: TileId, pixels: Vec<u8>) -> Self {
        Self { tile, pixels }
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        if let Err(e) = state.tiles.insert_with_id(self.tile, self.pixels.clone()) {
            tracing::warn!("Failed to restore tile {}: {e}", self.tile);
        }
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        if state.tiles.remove(self.tile).is_none() {
            tracing::warn!("Tile {} is not in the catalog", self.tile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixtile_mod_history::TempDirOffloadStore;

    fn change(tile: u32) -> TileChange {
        TileChange {
            tile: TileId(tile),
            before: vec![0; 4],
            after: vec![1; 4],
            positions: vec![TilePosition {
                layer: LayerId(1),
                column: 0,
                row: 0,
            }],
        }
    }

    #[test]
    fn test_has_changes() {
        assert!(!TilePropagation::new("Edit Tile", TilePayload::default()).has_changes());

        let mut same = change(0);
        same.after = same.before.clone();
        let payload = TilePayload {
            tiles: vec![same],
            ..TilePayload::default()
        };
        assert!(!TilePropagation::new("Edit Tile", payload).has_changes());

        let payload = TilePayload {
            tiles: vec![change(0)],
            ..TilePayload::default()
        };
        assert!(TilePropagation::new("Edit Tile", payload).has_changes());
    }

    #[test]
    fn test_created_mapping_counts_as_change() {
        let payload = TilePayload {
            mappings: vec![MappingChange {
                position: TilePosition {
                    layer: LayerId(1),
                    column: 0,
                    row: 0,
                },
                before: None,
                after: None,
                created: true,
            }],
            ..TilePayload::default()
        };
        assert!(TilePropagation::new("Stamp Tile", payload).has_changes());
    }

    #[test]
    fn test_offload_round_trip() {
        let store = TempDirOffloadStore::new().expect("store");
        let payload = TilePayload {
            tiles: vec![change(3)],
            ..TilePayload::default()
        };
        let mut item = TilePropagation::new("Edit Tile", payload.clone());
        assert!(item.offload(store.as_ref()));
        assert!(item.payload().is_none());
        assert!(item.reload(store.as_ref()));
        assert_eq!(item.payload(), Some(&payload));
    }
}
