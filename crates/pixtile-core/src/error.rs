/// Errors returned by document operations.
///
/// Every operation validates its input before touching the document, so an
/// `Err` always means nothing changed.
use thiserror::Error;

use crate::layer::LayerId;
use crate::tiles::TileId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("layer {0} not found")]
    LayerNotFound(LayerId),

    #[error("layer {0} is not a raster layer")]
    NotARasterLayer(LayerId),

    #[error("layer {0} is not a folder")]
    NotAFolder(LayerId),

    #[error("no raster layer below {0} to merge into")]
    NoLayerBelow(LayerId),

    #[error("invalid dimensions {width}x{height}: both must be positive")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("moving {layer} into {target} would create a cycle")]
    CycleDetected { layer: LayerId, target: LayerId },

    #[error("tile {0} not found")]
    TileNotFound(TileId),

    #[error("tile {0} is still mapped on the canvas")]
    TileInUse(TileId),

    #[error("cell ({column}, {row}) is outside the {columns}x{rows} tile grid")]
    CellOutOfBounds {
        column: u32,
        row: u32,
        columns: u32,
        rows: u32,
    },

    #[error("region {width}x{height} at ({x}, {y}) is outside the {bounds_width}x{bounds_height} surface")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bounds_width: u32,
        bounds_height: u32,
    },

    #[error("buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("layer {0} is locked")]
    LayerLocked(LayerId),

    #[error("invalid document record: {0}")]
    InvalidRecord(String),
}
