//! Pixel and tile operations.
//!
//! A pixel commit inspects every changed pixel. Pixels inside a mapped cell
//! edit that cell's tile, which then propagates to every cell mapped to the
//! same tile, on any layer. All other pixels are recorded as direct deltas.

use std::collections::BTreeMap;

use crate::document::CanvasDocument;
use crate::error::DocumentError;
use crate::history::{
    HistoryItem, LayerDeltas, MappingChange, PixelDeltaItem, PixelDeltas, RemoveTileItem,
    TileChange, TilePayload, TilePosition, TilePropagation,
};
use crate::layer::{LayerId, RasterLayer};
use crate::mapping::TileMapping;
use crate::surface::{buffer_len, pack, Rect, BYTES_PER_PIXEL};
use crate::tiles::TileId;

impl CanvasDocument {
    fn editable_raster(&self, layer: LayerId) -> Result<&RasterLayer, DocumentError> {
        let raster = self.state.tree.raster(layer)?;
        if self.state.tree.effective_locked(layer) {
            return Err(DocumentError::LayerLocked(layer));
        }
        Ok(raster)
    }

    /// Commits the after-pixels of `rect` on a raster layer, as produced by
    /// a brush or fill. `after` is a tightly packed BGRA buffer for `rect`.
    ///
    /// Unchanged pixels are ignored. If no changed pixel falls in a mapped
    /// cell this records a plain pixel delta; otherwise the edited tiles are
    /// propagated to every cell that maps them. Where several pixels of one
    /// stroke land on the same tile pixel, the last in row-major order wins.
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`, `NotARasterLayer`, `LayerLocked`,
    /// `RegionOutOfBounds` or `BufferSizeMismatch`.
    pub fn commit_pixels(
        &mut self,
        layer: LayerId,
        rect: Rect,
        after: &[u8],
    ) -> Result<bool, DocumentError> {
        let raster = self.editable_raster(layer)?;
        let (width, height) = (self.state.width, self.state.height);
        let fits_x = rect.x.checked_add(rect.width).is_some_and(|r| r <= width);
        let fits_y = rect.y.checked_add(rect.height).is_some_and(|b| b <= height);
        if !fits_x || !fits_y {
            return Err(DocumentError::RegionOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                bounds_width: width,
                bounds_height: height,
            });
        }
        let expected = buffer_len(rect.width, rect.height);
        if after.len() != expected {
            return Err(DocumentError::BufferSizeMismatch {
                expected,
                actual: after.len(),
            });
        }

        let tiles = &self.state.tiles;
        let (tile_width, tile_height) = (tiles.tile_width(), tiles.tile_height());
        let mapping = raster.active_mapping();
        let mut direct = PixelDeltas::new();
        let mut edited: BTreeMap<TileId, Vec<u8>> = BTreeMap::new();

        for row in 0..rect.height {
            for column in 0..rect.width {
                let (x, y) = (rect.x + column, rect.y + row);
                let offset = raster.surface.offset_of(x, y);
                let before = raster.surface.read_at(offset);
                let src = (row as usize * rect.width as usize + column as usize) * BYTES_PER_PIXEL;
                let px = &after[src..src + BYTES_PER_PIXEL];
                let value = pack([px[0], px[1], px[2], px[3]]);
                if before == value {
                    continue;
                }

                let (cell_x, cell_y) = TileMapping::cell_at(x, y, tile_width, tile_height);
                let tile = mapping
                    .and_then(|m| m.get(cell_x, cell_y))
                    .and_then(|id| tiles.get(id));
                match tile {
                    Some(tile) => {
                        let buffer = edited
                            .entry(tile.id())
                            .or_insert_with(|| tile.pixels().to_vec());
                        let local_x = x - cell_x * tile_width;
                        let local_y = y - cell_y * tile_height;
                        let at = (local_y as usize * tile_width as usize + local_x as usize)
                            * BYTES_PER_PIXEL;
                        buffer[at..at + BYTES_PER_PIXEL].copy_from_slice(px);
                    }
                    None => direct.record(offset, before, value),
                }
            }
        }

        if edited.is_empty() {
            let item = PixelDeltaItem::new(layer, direct);
            return Ok(self.commit(HistoryItem::PixelDelta(item)));
        }

        let mut payload = TilePayload::default();
        for (tile, after) in edited {
            let Some(definition) = self.state.tiles.get(tile) else {
                continue;
            };
            payload.tiles.push(TileChange {
                tile,
                before: definition.pixels().to_vec(),
                after,
                positions: self.state.tile_positions(tile),
            });
        }
        if !direct.is_empty() {
            payload.direct.push(LayerDeltas {
                layer,
                deltas: direct,
            });
        }
        tracing::debug!(
            "Stroke on {layer} edits {} tile(s) across {} cell(s)",
            payload.tiles.len(),
            payload.tiles.iter().map(|t| t.positions.len()).sum::<usize>()
        );
        let item = TilePropagation::new("Paint Tiles", payload);
        Ok(self.commit(HistoryItem::TileMixedEdit(item)))
    }

    /// Adds a tile definition to the catalog. Catalog growth is not an
    /// undoable edit.
    ///
    /// # Errors
    ///
    /// Returns `BufferSizeMismatch` if `pixels` isn't one tile.
    pub fn define_tile(&mut self, pixels: Vec<u8>) -> Result<TileId, DocumentError> {
        let id = self.state.tiles.add(pixels)?;
        tracing::info!("Defined tile {id}");
        self.flush_events();
        Ok(id)
    }

    /// Replaces a tile's pixels and repaints every cell mapped to it.
    ///
    /// # Errors
    ///
    /// Returns `TileNotFound` or `BufferSizeMismatch`.
    pub fn update_tile(&mut self, tile: TileId, pixels: &[u8]) -> Result<bool, DocumentError> {
        let definition = self
            .state
            .tiles
            .get(tile)
            .ok_or(DocumentError::TileNotFound(tile))?;
        let expected = self.state.tiles.tile_len();
        if pixels.len() != expected {
            return Err(DocumentError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        let change = TileChange {
            tile,
            before: definition.pixels().to_vec(),
            after: pixels.to_vec(),
            positions: self.state.tile_positions(tile),
        };
        let payload = TilePayload {
            tiles: vec![change],
            ..TilePayload::default()
        };
        Ok(self.commit(HistoryItem::TileDefinitionEdit(TilePropagation::new(
            "Edit Tile",
            payload,
        ))))
    }

    /// Paints a tile into one cell. With `write_mapping` the cell is mapped
    /// to the tile; without it, a previously mapped cell becomes unmapped,
    /// since its pixels no longer follow the old tile.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`, `NotARasterLayer`, `LayerLocked`,
    /// `TileNotFound` or `CellOutOfBounds`.
    pub fn stamp_tile(
        &mut self,
        layer: LayerId,
        column: u32,
        row: u32,
        tile: TileId,
        write_mapping: bool,
    ) -> Result<bool, DocumentError> {
        let raster = self.editable_raster(layer)?;
        let tiles = &self.state.tiles;
        let definition = tiles.get(tile).ok_or(DocumentError::TileNotFound(tile))?;
        let (tile_width, tile_height) = (tiles.tile_width(), tiles.tile_height());
        let (width, height) = (raster.surface.width(), raster.surface.height());
        let grid = TileMapping::for_layer(width, height, tile_width, tile_height);
        raster
            .mapping
            .as_ref()
            .unwrap_or(&grid)
            .check_cell(column, row)?;

        let mut deltas = PixelDeltas::new();
        let cell = TileMapping::cell_rect(column, row, tile_width, tile_height);
        if let Some(clip) = cell.clip(width, height) {
            for local_y in 0..clip.height {
                for local_x in 0..clip.width {
                    let offset = raster.surface.offset_of(clip.x + local_x, clip.y + local_y);
                    let src = (local_y as usize * tile_width as usize + local_x as usize)
                        * BYTES_PER_PIXEL;
                    let px = &definition.pixels()[src..src + BYTES_PER_PIXEL];
                    let value = pack([px[0], px[1], px[2], px[3]]);
                    deltas.record(offset, raster.surface.read_at(offset), value);
                }
            }
        }

        let position = TilePosition { layer, column, row };
        let current = raster.mapping.as_ref().and_then(|m| m.get(column, row));
        let mapping = if write_mapping {
            Some(MappingChange {
                position,
                before: current,
                after: Some(tile),
                created: raster.mapping.is_none(),
            })
        } else {
            current.map(|before| MappingChange {
                position,
                before: Some(before),
                after: None,
                created: false,
            })
        };

        let payload = TilePayload {
            direct: vec![LayerDeltas { layer, deltas }],
            tiles: Vec::new(),
            mappings: mapping.into_iter().collect(),
        };
        Ok(self.commit(HistoryItem::TileStamp(TilePropagation::new("Stamp Tile", payload))))
    }

    /// Unmaps every cell of a layer. Pixels are kept.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`, `NotARasterLayer` or `LayerLocked`.
    pub fn clear_tile_mapping(&mut self, layer: LayerId) -> Result<bool, DocumentError> {
        let raster = self.editable_raster(layer)?;
        let Some(mapping) = &raster.mapping else {
            return Ok(false);
        };
        let mappings = mapping
            .mapped_cells()
            .map(|(column, row, tile)| MappingChange {
                position: TilePosition { layer, column, row },
                before: Some(tile),
                after: None,
                created: false,
            })
            .collect();
        let payload = TilePayload {
            mappings,
            ..TilePayload::default()
        };
        Ok(self.commit(HistoryItem::TileStamp(TilePropagation::new(
            "Clear Tile Mapping",
            payload,
        ))))
    }

    /// Deletes an unused tile from the catalog. Undo restores the definition
    /// under the same id, so undoing further back never meets a mapping to a
    /// missing tile.
    ///
    /// # Errors
    ///
    /// Returns `TileInUse` while any layer maps the tile, or `TileNotFound`.
    pub fn remove_tile(&mut self, tile: TileId) -> Result<(), DocumentError> {
        let definition = self
            .state
            .tiles
            .get(tile)
            .ok_or(DocumentError::TileNotFound(tile))?;
        if self.state.tile_in_use(tile) {
            return Err(DocumentError::TileInUse(tile));
        }
        let item = RemoveTileItem::new(tile, definition.pixels().to_vec());
        tracing::info!("Removing tile {tile}");
        self.commit(HistoryItem::RemoveTile(item));
        Ok(())
    }
}
