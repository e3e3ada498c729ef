/// Per-layer grid of tile references.
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::surface::Rect;
use crate::tiles::TileId;

/// Columns x rows grid of optional tile ids, row-major.
///
/// The grid covers the owning layer in tile-sized cells; the last column and
/// row may be partial when the layer size isn't a multiple of the tile size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileMapping {
    columns: u32,
    rows: u32,
    cells: Vec<Option<TileId>>,
}

impl TileMapping {
    /// Creates an unmapped grid.
    pub fn new(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            cells: vec![None; columns as usize * rows as usize],
        }
    }

    /// Creates an unmapped grid covering a `width` x `height` layer.
    pub fn for_layer(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        let (columns, rows) = grid_size(width, height, tile_width, tile_height);
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn in_bounds(&self, column: u32, row: u32) -> bool {
        column < self.columns && row < self.rows
    }

    /// Tile at a cell; `None` when unmapped or out of bounds.
    pub fn get(&self, column: u32, row: u32) -> Option<TileId> {
        if !self.in_bounds(column, row) {
            return None;
        }
        self.cells[self.index(column, row)]
    }

    /// Writes a cell and returns its previous value.
    ///
    /// # Errors
    ///
    /// Returns `CellOutOfBounds` if the cell lies outside the grid.
    pub fn set(
        &mut self,
        column: u32,
        row: u32,
        tile: Option<TileId>,
    ) -> Result<Option<TileId>, DocumentError> {
        self.check_cell(column, row)?;
        let index = self.index(column, row);
        Ok(std::mem::replace(&mut self.cells[index], tile))
    }

    /// # Errors
    ///
    /// Returns `CellOutOfBounds` if the cell lies outside the grid.
    pub fn check_cell(&self, column: u32, row: u32) -> Result<(), DocumentError> {
        if self.in_bounds(column, row) {
            Ok(())
        } else {
            Err(DocumentError::CellOutOfBounds {
                column,
                row,
                columns: self.columns,
                rows: self.rows,
            })
        }
    }

    /// Mapped cells as `(column, row, tile)`, row-major.
    pub fn mapped_cells(&self) -> impl Iterator<Item = (u32, u32, TileId)> + '_ {
        let columns = self.columns.max(1);
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.map(|tile| (i as u32 % columns, i as u32 / columns, tile))
        })
    }

    /// Cells referencing `tile`, row-major.
    pub fn cells_with(&self, tile: TileId) -> Vec<(u32, u32)> {
        self.mapped_cells()
            .filter(|(_, _, t)| *t == tile)
            .map(|(c, r, _)| (c, r))
            .collect()
    }

    pub fn references(&self, tile: TileId) -> bool {
        self.cells.contains(&Some(tile))
    }

    /// True when no cell is mapped.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Cell containing pixel (x, y).
    pub fn cell_at(x: u32, y: u32, tile_width: u32, tile_height: u32) -> (u32, u32) {
        (x / tile_width, y / tile_height)
    }

    /// Pixel rectangle covered by a cell, before clipping to the layer.
    pub fn cell_rect(column: u32, row: u32, tile_width: u32, tile_height: u32) -> Rect {
        Rect::new(column * tile_width, row * tile_height, tile_width, tile_height)
    }

    /// Returns a copy with `columns` x `rows` cells, anchored top-left.
    pub fn resized(&self, columns: u32, rows: u32) -> Self {
        let mut out = Self::new(columns, rows);
        for (column, row, tile) in self.mapped_cells() {
            if out.in_bounds(column, row) {
                let index = out.index(column, row);
                out.cells[index] = Some(tile);
            }
        }
        out
    }

    fn index(&self, column: u32, row: u32) -> usize {
        row as usize * self.columns as usize + column as usize
    }
}

/// Number of tile cells needed to cover a layer, rounding partial tiles up.
pub fn grid_size(width: u32, height: u32, tile_width: u32, tile_height: u32) -> (u32, u32) {
    (width.div_ceil(tile_width), height.div_ceil(tile_height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rounds_up() {
        assert_eq!(grid_size(16, 16, 8, 8), (2, 2));
        assert_eq!(grid_size(17, 9, 8, 8), (3, 2));
        let mapping = TileMapping::for_layer(10, 3, 4, 4);
        assert_eq!((mapping.columns(), mapping.rows()), (3, 1));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_set_returns_previous() {
        let mut mapping = TileMapping::new(4, 2);
        assert_eq!(mapping.set(3, 1, Some(TileId(7))), Ok(None));
        assert_eq!(mapping.set(3, 1, None), Ok(Some(TileId(7))));
        assert!(matches!(
            mapping.set(4, 0, Some(TileId(1))),
            Err(DocumentError::CellOutOfBounds { column: 4, .. })
        ));
    }

    #[test]
    fn test_shared_tile_lookup() {
        let mut mapping = TileMapping::new(5, 3);
        mapping.set(3, 1, Some(TileId(2))).expect("set");
        mapping.set(1, 1, Some(TileId(2))).expect("set");
        mapping.set(0, 0, Some(TileId(4))).expect("set");

        assert_eq!(mapping.cells_with(TileId(2)), vec![(1, 1), (3, 1)]);
        assert!(mapping.references(TileId(4)));
        assert!(!mapping.references(TileId(9)));
        assert_eq!(mapping.mapped_cells().count(), 3);
        assert_eq!(mapping.get(9, 9), None);
    }

    #[test]
    fn test_resized_drops_cells_outside() {
        let mut mapping = TileMapping::new(3, 3);
        mapping.set(0, 0, Some(TileId(1))).expect("set");
        mapping.set(2, 2, Some(TileId(2))).expect("set");
        let smaller = mapping.resized(2, 2);
        assert_eq!(smaller.get(0, 0), Some(TileId(1)));
        assert_eq!(smaller.mapped_cells().count(), 1);
    }

    #[test]
    fn test_cell_geometry() {
        assert_eq!(TileMapping::cell_at(9, 3, 4, 4), (2, 0));
        assert_eq!(TileMapping::cell_rect(2, 1, 4, 4), Rect::new(8, 4, 4, 4));
    }
}
