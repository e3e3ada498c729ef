//! Structural document operations: add, duplicate, remove, move, merge,
//! flatten, properties and the active-layer cursor.

use crate::composite::{composite, CompositeSource};
use crate::document::{CanvasDocument, DocumentEvent};
use crate::error::DocumentError;
use crate::history::{
    AddLayerItem, FlattenFolderItem, HistoryItem, LayerPropertiesItem, MergeDownItem,
    MoveToFolderItem, RemoveFolderItem, RemoveLayerItem, ReorderLayerItem,
};
use crate::layer::{
    LayerFolder, LayerId, LayerNode, LayerProperties, RasterLayer, ReferenceLayer,
};
use crate::surface::PixelSurface;
use crate::tree::TreePosition;

impl CanvasDocument {
    /// Where a new node goes: inside the active folder at the top, directly
    /// above the active leaf, or at the top of the root list.
    fn insertion_point(&self) -> TreePosition {
        let tree = &self.state.tree;
        let top_of_root = TreePosition {
            parent: None,
            index: tree.roots().len(),
        };
        let Some(active) = self.state.active.and_then(|id| tree.find(id)) else {
            return top_of_root;
        };
        match active {
            LayerNode::Folder(folder) => TreePosition {
                parent: Some(folder.base.id),
                index: folder.children.len(),
            },
            node => tree
                .position(node.id())
                .map(|p| TreePosition {
                    parent: p.parent,
                    index: p.index + 1,
                })
                .unwrap_or(top_of_root),
        }
    }

    fn insert_new(&mut self, description: &'static str, node: LayerNode, position: TreePosition) -> LayerId {
        let id = node.id();
        tracing::info!("{description}: '{}' ({id})", node.name());
        self.commit(HistoryItem::AddLayer(AddLayerItem::new(description, node, position)));
        self.activate(Some(id));
        id
    }

    /// Adds a raster layer filled with the default color above the active
    /// layer (or at the top of the active folder) and makes it active.
    pub fn add_layer(&mut self, name: Option<&str>) -> LayerId {
        let position = self.insertion_point();
        self.add_raster_at(position, name)
    }

    /// Adds a raster layer at an explicit position and makes it active.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound` or `NotAFolder` if `parent` isn't a folder.
    pub fn add_layer_at(
        &mut self,
        parent: Option<LayerId>,
        index: usize,
        name: Option<&str>,
    ) -> Result<LayerId, DocumentError> {
        self.check_folder(parent)?;
        Ok(self.add_raster_at(TreePosition { parent, index }, name))
    }

    fn add_raster_at(&mut self, position: TreePosition, name: Option<&str>) -> LayerId {
        let id = self.allocate_id();
        let name = name.map_or_else(|| format!("Layer {}", id.0), str::to_string);
        let layer = RasterLayer::new(id, name, self.blank_surface());
        self.insert_new("Add Layer", LayerNode::Raster(layer), position)
    }

    /// Adds an empty folder at the insertion point and makes it active.
    pub fn add_folder(&mut self, name: Option<&str>) -> LayerId {
        let position = self.insertion_point();
        let id = self.allocate_id();
        let name = name.map_or_else(|| format!("Folder {}", id.0), str::to_string);
        self.insert_new("Add Folder", LayerNode::Folder(LayerFolder::new(id, name)), position)
    }

    /// Adds a reference overlay at the insertion point and makes it active.
    pub fn add_reference_layer(&mut self, name: Option<&str>, image: PixelSurface) -> LayerId {
        let position = self.insertion_point();
        let id = self.allocate_id();
        let name = name.map_or_else(|| format!("Reference {}", id.0), str::to_string);
        let layer = ReferenceLayer::new(id, name, image);
        self.insert_new("Add Reference Layer", LayerNode::Reference(layer), position)
    }

    /// Copies a node (with its subtree, under fresh ids) directly above it.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`.
    pub fn duplicate_layer(&mut self, id: LayerId) -> Result<LayerId, DocumentError> {
        let source = self.state.tree.find(id).ok_or(DocumentError::LayerNotFound(id))?;
        let mut copy = source.clone();
        let position = self
            .state
            .tree
            .position(id)
            .ok_or(DocumentError::LayerNotFound(id))?;
        self.renumber(&mut copy, position.parent);
        let name = format!("{} copy", copy.name());
        copy.base_mut().name = name;
        let target = TreePosition {
            parent: position.parent,
            index: position.index + 1,
        };
        Ok(self.insert_new("Duplicate Layer", copy, target))
    }

    fn renumber(&mut self, node: &mut LayerNode, parent: Option<LayerId>) {
        let id = self.allocate_id();
        let base = node.base_mut();
        base.id = id;
        base.parent = parent;
        if let LayerNode::Folder(folder) = node {
            for child in &mut folder.children {
                self.renumber(child, Some(id));
            }
        }
    }

    /// Removes a node. A folder's children are moved to the root list, in
    /// order, where the folder was (or directly above its top-level
    /// ancestor if it was nested).
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<(), DocumentError> {
        let node = self.state.tree.find(id).ok_or(DocumentError::LayerNotFound(id))?;
        let position = self
            .state
            .tree
            .position(id)
            .ok_or(DocumentError::LayerNotFound(id))?;

        let item = match node {
            LayerNode::Folder(folder) => {
                let children: Vec<LayerId> = folder.children.iter().map(LayerNode::id).collect();
                let root_index = match position.parent {
                    None => position.index,
                    Some(_) => self.root_index_above_ancestor(id)?,
                };
                tracing::info!("Removing folder {id}, {} children move to root", children.len());
                HistoryItem::RemoveFolder(RemoveFolderItem::new(id, position, root_index, children))
            }
            _ => {
                tracing::info!("Removing layer {id}");
                HistoryItem::RemoveLayer(RemoveLayerItem::new(id, position))
            }
        };
        self.commit(item);
        Ok(())
    }

    fn root_index_above_ancestor(&self, id: LayerId) -> Result<usize, DocumentError> {
        let tree = &self.state.tree;
        let top = tree.top_level_ancestor(id).ok_or(DocumentError::LayerNotFound(id))?;
        let position = tree.position(top).ok_or(DocumentError::LayerNotFound(top))?;
        Ok(position.index + 1)
    }

    /// Moves a node to `index` within its current parent, clamped to the
    /// last position. Moving to the current index records nothing.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`.
    pub fn move_layer(&mut self, id: LayerId, index: usize) -> Result<(), DocumentError> {
        let tree = &self.state.tree;
        let position = tree.position(id).ok_or(DocumentError::LayerNotFound(id))?;
        let count = tree.siblings(position.parent).map_or(1, Vec::len);
        let to = index.min(count.saturating_sub(1));
        self.commit(HistoryItem::ReorderLayer(ReorderLayerItem::new(id, position.index, to)));
        Ok(())
    }

    /// Moves a node into `folder` (or the root for `None`) at `index`,
    /// counted after the node has left its current place; `None` puts it on top.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`, `NotAFolder`, or `CycleDetected` when the
    /// destination is the node itself or inside it.
    pub fn move_to_folder(
        &mut self,
        id: LayerId,
        folder: Option<LayerId>,
        index: Option<usize>,
    ) -> Result<(), DocumentError> {
        let tree = &self.state.tree;
        let from = tree.position(id).ok_or(DocumentError::LayerNotFound(id))?;
        self.check_folder(folder)?;
        if let Some(target) = folder {
            if tree.is_ancestor_or_self(id, target) {
                return Err(DocumentError::CycleDetected { layer: id, target });
            }
        }

        let mut available = tree.siblings(folder).map_or(0, Vec::len);
        if from.parent == folder {
            available -= 1;
        }
        let to = TreePosition {
            parent: folder,
            index: index.unwrap_or(available).min(available),
        };
        self.commit(HistoryItem::MoveToFolder(MoveToFolderItem::new(id, from, to)));
        Ok(())
    }

    fn check_folder(&self, folder: Option<LayerId>) -> Result<(), DocumentError> {
        let Some(id) = folder else {
            return Ok(());
        };
        match self.state.tree.find(id) {
            None => Err(DocumentError::LayerNotFound(id)),
            Some(node) if !node.is_folder() => Err(DocumentError::NotAFolder(id)),
            Some(_) => Ok(()),
        }
    }

    /// Merges a raster layer onto the raster layer directly below it in the
    /// same parent. The result replaces the lower layer and becomes active.
    ///
    /// The merged pixels are the composite of the visible layers among the
    /// two, so the result has full opacity and no mask. It keeps the lower
    /// layer's name, lock, blend mode and effects, is visible if either
    /// layer was, and has no tile mapping.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`, `NotARasterLayer`, or `NoLayerBelow` when the
    /// node below isn't a raster layer.
    pub fn merge_down(&mut self, id: LayerId) -> Result<LayerId, DocumentError> {
        let tree = &self.state.tree;
        let upper = tree.raster(id)?;
        let position = tree.position(id).ok_or(DocumentError::LayerNotFound(id))?;
        if position.index == 0 {
            return Err(DocumentError::NoLayerBelow(id));
        }
        let lower = tree
            .siblings(position.parent)
            .and_then(|s| s.get(position.index - 1))
            .and_then(LayerNode::as_raster)
            .ok_or(DocumentError::NoLayerBelow(id))?;

        // Opacity and mask of both layers are baked into the pixels.
        let sources: Vec<CompositeSource<'_>> = [lower, upper]
            .into_iter()
            .filter(|layer| layer.base.visible)
            .map(CompositeSource::from_layer)
            .collect();
        let surface = composite(lower.surface.width(), lower.surface.height(), &sources);
        let (upper_id, lower_id) = (upper.base.id, lower.base.id);
        let mut merged = RasterLayer {
            base: lower.base.clone(),
            surface,
            opacity: 1.0,
            blend_mode: lower.blend_mode,
            mapping: None,
            mask: None,
            effects: lower.effects.clone(),
        };
        merged.base.visible = lower.base.visible || upper.base.visible;
        merged.base.id = self.allocate_id();
        let merged_id = merged.base.id;

        let lower_position = TreePosition {
            parent: position.parent,
            index: position.index - 1,
        };
        tracing::info!("Merging {upper_id} down onto {lower_id} as {merged_id}");
        let item = MergeDownItem::new(upper_id, lower_id, lower_position, LayerNode::Raster(merged));
        self.commit(HistoryItem::MergeDown(item));
        self.activate(Some(merged_id));
        Ok(merged_id)
    }

    /// Replaces a folder with one raster layer holding the composite of its
    /// visible raster descendants. The new layer becomes active.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound` or `NotAFolder`.
    pub fn flatten_folder(&mut self, id: LayerId) -> Result<LayerId, DocumentError> {
        let tree = &self.state.tree;
        let node = tree.find(id).ok_or(DocumentError::LayerNotFound(id))?;
        let folder = node.as_folder().ok_or(DocumentError::NotAFolder(id))?;
        let position = tree.position(id).ok_or(DocumentError::LayerNotFound(id))?;

        let mut sources = Vec::new();
        collect_visible(&folder.children, &mut sources);
        let surface = composite(self.state.width, self.state.height, &sources);
        let mut flattened = RasterLayer::new(LayerId(0), folder.base.name.clone(), surface);
        flattened.base.visible = folder.base.visible;
        flattened.base.locked = folder.base.locked;
        flattened.base.id = self.allocate_id();
        let flattened_id = flattened.base.id;

        tracing::info!("Flattening folder {id} into {flattened_id}");
        let item = FlattenFolderItem::new(id, position, LayerNode::Raster(flattened));
        self.commit(HistoryItem::FlattenFolder(item));
        self.activate(Some(flattened_id));
        Ok(flattened_id)
    }

    /// Current properties of a node.
    pub fn layer_properties(&self, id: LayerId) -> Option<LayerProperties> {
        self.state.tree.find(id).map(LayerProperties::of)
    }

    /// Sets name, visibility, lock, opacity and blend mode in one step.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`.
    pub fn set_layer_properties(
        &mut self,
        id: LayerId,
        properties: LayerProperties,
    ) -> Result<bool, DocumentError> {
        let node = self.state.tree.find(id).ok_or(DocumentError::LayerNotFound(id))?;
        let before = LayerProperties::of(node);
        let mut after = properties;
        after.opacity = after.opacity.clamp(0.0, 1.0);
        let item = LayerPropertiesItem::new(id, before, after);
        Ok(self.commit(HistoryItem::LayerProperties(item)))
    }

    /// Moves the active-layer cursor. Not recorded in history.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound`.
    pub fn set_active_layer(&mut self, id: Option<LayerId>) -> Result<(), DocumentError> {
        if let Some(id) = id {
            if !self.state.tree.contains(id) {
                return Err(DocumentError::LayerNotFound(id));
            }
        }
        self.activate(id);
        Ok(())
    }

    fn activate(&mut self, id: Option<LayerId>) {
        if self.state.active != id {
            self.state.active = id;
            self.state.notify(DocumentEvent::ActiveLayerChanged(id));
            self.flush_events();
        }
    }
}

fn collect_visible<'a>(nodes: &'a [LayerNode], out: &mut Vec<CompositeSource<'a>>) {
    for node in nodes {
        if !node.base().visible {
            continue;
        }
        match node {
            LayerNode::Raster(layer) => out.push(CompositeSource::from_layer(layer)),
            LayerNode::Folder(folder) => collect_visible(&folder.children, out),
            LayerNode::Reference(_) => {}
        }
    }
}
