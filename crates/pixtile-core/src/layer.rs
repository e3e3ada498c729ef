/// Layer node kinds: raster layers, folders and reference overlays.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mapping::TileMapping;
use crate::surface::PixelSurface;

/// Document-assigned layer identifier, stable for the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u64);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// How a layer is meant to combine with what lies below it.
///
/// Only `Normal` is rendered by the built-in compositor; the others are
/// stored and persisted for renderers that implement them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Additive,
    Difference,
}

/// One alpha byte per layer pixel, multiplied into the layer's coverage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl std::fmt::Debug for LayerMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerMask")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl LayerMask {
    /// Creates a mask that reveals everything.
    pub fn opaque(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![u8::MAX; width as usize * height as usize],
        }
    }

    /// Wraps an alpha buffer; `None` if its length doesn't match.
    pub fn from_alpha(width: u32, height: u32, alpha: Vec<u8>) -> Option<Self> {
        (alpha.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            alpha,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Alpha at (x, y); pixels outside the mask are hidden.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.alpha[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x < self.width && y < self.height {
            self.alpha[y as usize * self.width as usize + x as usize] = value;
        }
    }

    /// Copy resized to `width` x `height`, anchored top-left. New area is revealed.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let mut out = Self::opaque(width, height);
        for y in 0..self.height.min(height) {
            for x in 0..self.width.min(width) {
                out.set(x, y, self.get(x, y));
            }
        }
        out
    }
}

/// A non-destructive effect attached to a raster layer. Carried and
/// persisted, not rendered by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEffect {
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

/// Properties every node kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerBase {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    /// Folder holding this node; `None` at the root. Kept in sync by the tree.
    pub parent: Option<LayerId>,
}

impl LayerBase {
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            locked: false,
            parent: None,
        }
    }
}

/// A paintable layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterLayer {
    pub base: LayerBase,
    pub surface: PixelSurface,
    /// 0.0..=1.0
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub mapping: Option<TileMapping>,
    pub mask: Option<LayerMask>,
    pub effects: Vec<LayerEffect>,
}

impl RasterLayer {
    pub fn new(id: LayerId, name: impl Into<String>, surface: PixelSurface) -> Self {
        Self {
            base: LayerBase::new(id, name),
            surface,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            mapping: None,
            mask: None,
            effects: Vec::new(),
        }
    }

    /// Mapping with at least one mapped cell.
    pub fn active_mapping(&self) -> Option<&TileMapping> {
        self.mapping.as_ref().filter(|m| !m.is_empty())
    }
}

/// An ordered group of nodes. Index 0 is the bottom-most child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerFolder {
    pub base: LayerBase,
    pub children: Vec<LayerNode>,
    pub expanded: bool,
}

impl LayerFolder {
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            base: LayerBase::new(id, name),
            children: Vec::new(),
            expanded: true,
        }
    }
}

/// A tracing overlay. It sits in the tree but is never composited, merged
/// or tile-mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLayer {
    pub base: LayerBase,
    pub image: PixelSurface,
    pub offset: (i32, i32),
    pub opacity: f32,
}

impl ReferenceLayer {
    pub fn new(id: LayerId, name: impl Into<String>, image: PixelSurface) -> Self {
        Self {
            base: LayerBase::new(id, name),
            image,
            offset: (0, 0),
            opacity: 0.5,
        }
    }
}

/// Any node of the layer tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerNode {
    Raster(RasterLayer),
    Folder(LayerFolder),
    Reference(ReferenceLayer),
}

impl LayerNode {
    pub fn base(&self) -> &LayerBase {
        match self {
            Self::Raster(layer) => &layer.base,
            Self::Folder(folder) => &folder.base,
            Self::Reference(layer) => &layer.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut LayerBase {
        match self {
            Self::Raster(layer) => &mut layer.base,
            Self::Folder(folder) => &mut folder.base,
            Self::Reference(layer) => &mut layer.base,
        }
    }

    pub fn id(&self) -> LayerId {
        self.base().id
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Raster(_) => "raster",
            Self::Folder(_) => "folder",
            Self::Reference(_) => "reference",
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }

    pub fn as_raster(&self) -> Option<&RasterLayer> {
        match self {
            Self::Raster(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_raster_mut(&mut self) -> Option<&mut RasterLayer> {
        match self {
            Self::Raster(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&LayerFolder> {
        match self {
            Self::Folder(folder) => Some(folder),
            _ => None,
        }
    }

    pub fn as_folder_mut(&mut self) -> Option<&mut LayerFolder> {
        match self {
            Self::Folder(folder) => Some(folder),
            _ => None,
        }
    }

    /// Children of a folder; empty for leaves.
    pub fn children(&self) -> &[LayerNode] {
        match self {
            Self::Folder(folder) => &folder.children,
            _ => &[],
        }
    }

    /// Rough heap size of the node and its subtree.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Self::Raster(layer) => {
                layer.surface.bytes().len() + layer.mask.as_ref().map_or(0, |m| m.alpha().len())
            }
            Self::Folder(folder) => folder.children.iter().map(LayerNode::estimated_bytes).sum(),
            Self::Reference(layer) => layer.image.bytes().len(),
        }
    }
}

/// Editable properties shared by `set_layer_properties` and its history entry.
/// `opacity` and `blend_mode` only apply to raster and reference layers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerProperties {
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
}

impl LayerProperties {
    /// Reads the properties of `node`.
    pub fn of(node: &LayerNode) -> Self {
        let base = node.base();
        let (opacity, blend_mode) = match node {
            LayerNode::Raster(layer) => (layer.opacity, layer.blend_mode),
            LayerNode::Reference(layer) => (layer.opacity, BlendMode::Normal),
            LayerNode::Folder(_) => (1.0, BlendMode::Normal),
        };
        Self {
            name: base.name.clone(),
            visible: base.visible,
            locked: base.locked,
            opacity,
            blend_mode,
        }
    }

    /// Writes the properties onto `node`.
    pub fn apply(&self, node: &mut LayerNode) {
        let base = node.base_mut();
        base.name.clone_from(&self.name);
        base.visible = self.visible;
        base.locked = self.locked;
        match node {
            LayerNode::Raster(layer) => {
                layer.opacity = self.opacity.clamp(0.0, 1.0);
                layer.blend_mode = self.blend_mode;
            }
            LayerNode::Reference(layer) => layer.opacity = self.opacity.clamp(0.0, 1.0),
            LayerNode::Folder(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_accessors() {
        let raster = LayerNode::Raster(RasterLayer::new(LayerId(1), "Ink", PixelSurface::new(2, 2)));
        let folder = LayerNode::Folder(LayerFolder::new(LayerId(2), "Group"));
        assert_eq!(raster.id(), LayerId(1));
        assert_eq!(raster.kind(), "raster");
        assert!(raster.as_raster().is_some());
        assert!(raster.as_folder().is_none());
        assert!(folder.is_folder());
        assert!(folder.children().is_empty());
        assert_eq!(raster.estimated_bytes(), 16);
    }

    #[test]
    fn test_properties_apply_round_trip() {
        let mut node = LayerNode::Raster(RasterLayer::new(LayerId(1), "A", PixelSurface::new(1, 1)));
        let mut props = LayerProperties::of(&node);
        props.name = "B".into();
        props.opacity = 1.7;
        props.blend_mode = BlendMode::Multiply;
        props.apply(&mut node);

        let read = LayerProperties::of(&node);
        assert_eq!(read.name, "B");
        assert_eq!(read.opacity, 1.0);
        assert_eq!(read.blend_mode, BlendMode::Multiply);
    }

    #[test]
    fn test_mask_resize_and_bounds() {
        let mut mask = LayerMask::opaque(2, 2);
        mask.set(1, 1, 10);
        let resized = mask.resized(3, 1);
        assert_eq!(resized.get(1, 0), 255);
        assert_eq!(resized.get(2, 0), 255);
        assert_eq!(mask.get(5, 5), 0);
        assert!(LayerMask::from_alpha(2, 2, vec![0; 3]).is_none());
    }
}
