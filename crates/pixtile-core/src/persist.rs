/// Plain records at the persistence boundary.
///
/// A `DocumentRecord` holds everything needed to rebuild a document: canvas
/// and tile size, the tile catalog, and the layer tree with per-node
/// properties. Tile mappings are stored sparsely, one entry per mapped cell.
/// History is not part of a record.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::document::CanvasDocument;
use crate::error::DocumentError;
use crate::layer::{
    BlendMode, LayerBase, LayerEffect, LayerFolder, LayerId, LayerMask, LayerNode, RasterLayer,
    ReferenceLayer,
};
use crate::mapping::TileMapping;
use crate::surface::PixelSurface;
use crate::tiles::TileId;

/// One tile definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    /// BGRA
    pub pixels: Vec<u8>,
}

/// One mapped cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub column: u32,
    pub row: u32,
    pub tile_id: u32,
}

/// One node of the layer tree, children bottom to top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LayerRecord {
    Raster {
        id: u64,
        name: String,
        visible: bool,
        locked: bool,
        opacity: f32,
        #[serde(default)]
        blend_mode: BlendMode,
        /// BGRA, canvas-sized.
        pixels: Vec<u8>,
        /// `None` when the layer has no tile grid.
        #[serde(default)]
        mapping: Option<Vec<MappingEntry>>,
        #[serde(default)]
        mask: Option<Vec<u8>>,
        #[serde(default)]
        effects: Vec<LayerEffect>,
    },
    Folder {
        id: u64,
        name: String,
        visible: bool,
        locked: bool,
        #[serde(default = "default_expanded")]
        expanded: bool,
        children: Vec<LayerRecord>,
    },
    Reference {
        id: u64,
        name: String,
        visible: bool,
        locked: bool,
        opacity: f32,
        #[serde(default)]
        offset: (i32, i32),
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

fn default_expanded() -> bool {
    true
}

/// A whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    #[serde(default)]
    pub tiles: Vec<TileRecord>,
    /// Root nodes, bottom to top.
    pub layers: Vec<LayerRecord>,
    #[serde(default)]
    pub active_layer: Option<u64>,
}

impl CanvasDocument {
    /// Captures the document content as a record.
    pub fn to_record(&self) -> DocumentRecord {
        let (tile_width, tile_height) = self.tile_size();
        let tiles = self
            .tiles()
            .iter()
            .map(|tile| TileRecord {
                id: tile.id().0,
                width: tile.width(),
                height: tile.height(),
                pixels: tile.pixels().to_vec(),
            })
            .collect();
        DocumentRecord {
            width: self.width(),
            height: self.height(),
            tile_width,
            tile_height,
            tiles,
            layers: self.tree().roots().iter().map(node_record).collect(),
            active_layer: self.active_layer().map(|id| id.0),
        }
    }

    /// Rebuilds a document from a record, with an empty history.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` for zero sizes, `BufferSizeMismatch` for
    /// wrongly sized pixel data, `TileNotFound` or `CellOutOfBounds` for bad
    /// mapping entries, and `InvalidRecord` for duplicate ids, mismatched
    /// tile sizes or an unknown active layer.
    pub fn from_record(record: &DocumentRecord) -> Result<Self, DocumentError> {
        let mut doc = Self::empty(
            record.width,
            record.height,
            record.tile_width,
            record.tile_height,
        )?;

        for tile in &record.tiles {
            if tile.width != record.tile_width || tile.height != record.tile_height {
                return Err(DocumentError::InvalidRecord(format!(
                    "tile #{} is {}x{}, catalog tiles are {}x{}",
                    tile.id, tile.width, tile.height, record.tile_width, record.tile_height
                )));
            }
            doc.state
                .tiles
                .insert_with_id(TileId(tile.id), tile.pixels.clone())?;
        }

        let mut seen = HashSet::new();
        let mut roots = Vec::with_capacity(record.layers.len());
        for layer in &record.layers {
            roots.push(build_node(&doc, layer, None, &mut seen)?);
        }
        for (index, node) in roots.into_iter().enumerate() {
            doc.state.tree.insert(None, index, node)?;
        }

        let active = match record.active_layer.map(LayerId) {
            Some(id) if !doc.state.tree.contains(id) => {
                return Err(DocumentError::InvalidRecord(format!(
                    "active layer {id} is not in the tree"
                )));
            }
            active => active,
        };
        doc.state.active = active;
        doc.next_layer_id = doc.state.tree.max_id().map_or(1, |id| id.0 + 1);
        doc.state.composite_stale = true;
        // Loading isn't an edit; drop the catalog events it raised.
        doc.state.pending.clear();
        while doc.tile_events.try_recv().is_ok() {}
        tracing::info!(
            "Loaded {}x{} document: {} layers, {} tiles",
            record.width,
            record.height,
            doc.state.tree.len(),
            doc.state.tiles.len()
        );
        Ok(doc)
    }
}

fn node_record(node: &LayerNode) -> LayerRecord {
    let base = node.base();
    match node {
        LayerNode::Raster(layer) => LayerRecord::Raster {
            id: base.id.0,
            name: base.name.clone(),
            visible: base.visible,
            locked: base.locked,
            opacity: layer.opacity,
            blend_mode: layer.blend_mode,
            pixels: layer.surface.bytes().to_vec(),
            mapping: layer.mapping.as_ref().map(|mapping| {
                mapping
                    .mapped_cells()
                    .map(|(column, row, tile)| MappingEntry {
                        column,
                        row,
                        tile_id: tile.0,
                    })
                    .collect()
            }),
            mask: layer.mask.as_ref().map(|m| m.alpha().to_vec()),
            effects: layer.effects.clone(),
        },
        LayerNode::Folder(folder) => LayerRecord::Folder {
            id: base.id.0,
            name: base.name.clone(),
            visible: base.visible,
            locked: base.locked,
            expanded: folder.expanded,
            children: folder.children.iter().map(node_record).collect(),
        },
        LayerNode::Reference(reference) => LayerRecord::Reference {
            id: base.id.0,
            name: base.name.clone(),
            visible: base.visible,
            locked: base.locked,
            opacity: reference.opacity,
            offset: reference.offset,
            width: reference.image.width(),
            height: reference.image.height(),
            pixels: reference.image.bytes().to_vec(),
        },
    }
}

fn node_base(
    id: u64,
    name: &str,
    visible: bool,
    locked: bool,
    parent: Option<LayerId>,
    seen: &mut HashSet<u64>,
) -> Result<LayerBase, DocumentError> {
    if id == 0 || !seen.insert(id) {
        return Err(DocumentError::InvalidRecord(format!(
            "layer id {id} is zero or used twice"
        )));
    }
    let mut base = LayerBase::new(LayerId(id), name);
    base.visible = visible;
    base.locked = locked;
    base.parent = parent;
    Ok(base)
}

fn build_node(
    doc: &CanvasDocument,
    record: &LayerRecord,
    parent: Option<LayerId>,
    seen: &mut HashSet<u64>,
) -> Result<LayerNode, DocumentError> {
    let (width, height) = (doc.width(), doc.height());
    match record {
        LayerRecord::Raster {
            id,
            name,
            visible,
            locked,
            opacity,
            blend_mode,
            pixels,
            mapping,
            mask,
            effects,
        } => {
            let base = node_base(*id, name, *visible, *locked, parent, seen)?;
            let surface = PixelSurface::from_bytes(width, height, pixels.clone())?;
            let mapping = match mapping {
                Some(entries) => Some(build_mapping(doc, entries)?),
                None => None,
            };
            let mask = match mask {
                Some(alpha) => Some(LayerMask::from_alpha(width, height, alpha.clone()).ok_or_else(
                    || DocumentError::InvalidRecord(format!("mask of layer {id} is the wrong size")),
                )?),
                None => None,
            };
            Ok(LayerNode::Raster(RasterLayer {
                base,
                surface,
                opacity: opacity.clamp(0.0, 1.0),
                blend_mode: *blend_mode,
                mapping,
                mask,
                effects: effects.clone(),
            }))
        }
        LayerRecord::Folder {
            id,
            name,
            visible,
            locked,
            expanded,
            children,
        } => {
            let base = node_base(*id, name, *visible, *locked, parent, seen)?;
            let mut folder = LayerFolder::new(base.id, name.clone());
            folder.base = base;
            folder.expanded = *expanded;
            for child in children {
                let node = build_node(doc, child, Some(folder.base.id), seen)?;
                folder.children.push(node);
            }
            Ok(LayerNode::Folder(folder))
        }
        LayerRecord::Reference {
            id,
            name,
            visible,
            locked,
            opacity,
            offset,
            width,
            height,
            pixels,
        } => {
            let base = node_base(*id, name, *visible, *locked, parent, seen)?;
            let image = PixelSurface::from_bytes(*width, *height, pixels.clone())?;
            let mut reference = ReferenceLayer::new(base.id, name.clone(), image);
            reference.base = base;
            reference.opacity = opacity.clamp(0.0, 1.0);
            reference.offset = *offset;
            Ok(LayerNode::Reference(reference))
        }
    }
}

fn build_mapping(
    doc: &CanvasDocument,
    entries: &[MappingEntry],
) -> Result<TileMapping, DocumentError> {
    let (tile_width, tile_height) = doc.tile_size();
    let mut mapping = TileMapping::for_layer(doc.width(), doc.height(), tile_width, tile_height);
    for entry in entries {
        let tile = TileId(entry.tile_id);
        if !doc.tiles().contains(tile) {
            return Err(DocumentError::TileNotFound(tile));
        }
        mapping.set(entry.column, entry.row, Some(tile))?;
    }
    Ok(mapping)
}
