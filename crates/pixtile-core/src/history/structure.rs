//! Structural history items: adding, removing, moving, merging and
//! flattening tree nodes, and layer property edits.
//!
//! Items that take a node out of the tree keep it (with its whole subtree)
//! until they put it back, so no node is ever rebuilt on undo. Held nodes
//! can be parked in an offload blob like any other heavy payload.

use pixtile_mod_history::{OffloadService, Offloadable};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::document::DocumentState;
use crate::layer::{LayerId, LayerNode, LayerProperties};
use crate::tree::TreePosition;

/// Nodes an item holds while they are out of the tree.
#[derive(Debug)]
struct Held<T>(Option<Offloadable<T>>);

impl<T> Held<T> {
    fn empty() -> Self {
        Self(None)
    }

    fn holding(value: T) -> Self {
        Self(Some(Offloadable::new(value)))
    }

    fn put(&mut self, value: Option<T>) {
        self.0 = value.map(Offloadable::new);
    }

    fn take(&mut self, what: &str) -> Option<T> {
        match self.0.take() {
            Some(Offloadable::Resident(value)) => Some(value),
            Some(Offloadable::Offloaded(id)) => panic!("{what} replayed while offloaded ({id})"),
            None => {
                tracing::warn!("{what}: no stored node to reinsert");
                None
            }
        }
    }

    fn resident(&self) -> Option<&T> {
        self.0.as_ref().and_then(Offloadable::get)
    }

    fn is_offloaded(&self) -> bool {
        self.0.as_ref().is_some_and(Offloadable::is_offloaded)
    }

    fn discard(&mut self, service: &dyn OffloadService) {
        if let Some(held) = &mut self.0 {
            held.discard(service);
        }
    }
}

impl<T: Serialize + DeserializeOwned> Held<T> {
    fn offload(&mut self, service: &dyn OffloadService) -> bool {
        self.0.as_mut().is_some_and(|held| held.offload(service))
    }

    fn reload(&mut self, service: &dyn OffloadService) -> bool {
        self.0.as_mut().map_or(true, |held| held.reload(service))
    }
}

/// Offload hooks shared by the items that hold layer nodes.
macro_rules! held_offload {
    ($item:ty => $($field:ident),+) => {
        impl $item {
            pub fn is_offloaded(&self) -> bool {
                false $(|| self.$field.is_offloaded())+
            }

            pub fn offload(&mut self, service: &dyn OffloadService) -> bool {
                let mut any = false;
                $(any |= self.$field.offload(service);)+
                any
            }

            pub fn reload(&mut self, service: &dyn OffloadService) -> bool {
                true $(&& self.$field.reload(service))+
            }

            pub fn discard(&mut self, service: &dyn OffloadService) {
                $(self.$field.discard(service);)+
            }
        }
    };
}

held_offload!(AddLayerItem => node);
held_offload!(RemoveLayerItem => node);
held_offload!(MergeDownItem => originals, merged_node);
held_offload!(FlattenFolderItem => folder_node, flattened_node);

fn insert_node(state: &mut DocumentState, position: TreePosition, node: LayerNode) {
    let id = node.id();
    if let Err(e) = state.tree.insert(position.parent, position.index, node) {
        tracing::warn!("Failed to reinsert {id}: {e}");
    }
}

fn detach_node(state: &mut DocumentState, id: LayerId) -> Option<LayerNode> {
    match state.tree.detach(id) {
        Some((node, _)) => Some(node),
        None => {
            tracing::warn!("Layer {id} is not in the tree");
            None
        }
    }
}

/// A node inserted into the tree. Also records duplicates.
#[derive(Debug)]
pub struct AddLayerItem {
    description: &'static str,
    id: LayerId,
    position: TreePosition,
    /// Present while the add is undone.
    node: Held<LayerNode>,
}

impl AddLayerItem {
    /// Wraps a node that is not in the tree yet; `redo` inserts it.
    pub fn new(description: &'static str, node: LayerNode, position: TreePosition) -> Self {
        Self {
            description,
            id: node.id(),
            position,
            node: Held::holding(node),
        }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn layer(&self) -> LayerId {
        self.id
    }

    pub fn estimated_bytes(&self) -> usize {
        self.node.resident().map_or(0, LayerNode::estimated_bytes)
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        self.node.put(detach_node(state, self.id));
        state.end_structure();
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        if let Some(node) = self.node.take(self.description) {
            insert_node(state, self.position, node);
        }
        state.end_structure();
    }
}

/// A raster or reference layer (or a folder with its whole subtree) taken
/// out of the tree.
#[derive(Debug)]
pub struct RemoveLayerItem {
    id: LayerId,
    position: TreePosition,
    /// Present while the removal is applied.
    node: Held<LayerNode>,
}

impl RemoveLayerItem {
    pub fn new(id: LayerId, position: TreePosition) -> Self {
        Self {
            id,
            position,
            node: Held::empty(),
        }
    }

    pub fn layer(&self) -> LayerId {
        self.id
    }

    pub fn estimated_bytes(&self) -> usize {
        self.node.resident().map_or(0, LayerNode::estimated_bytes)
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        if let Some(node) = self.node.take("Remove Layer") {
            insert_node(state, self.position, node);
        }
        state.end_structure();
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        self.node.put(detach_node(state, self.id));
        state.end_structure();
    }
}

/// A folder removed while its children move to the root list.
///
/// The children keep their relative order and land at `root_index`: the
/// folder's own index for a top-level folder, or directly above its
/// top-level ancestor for a nested one.
#[derive(Debug)]
pub struct RemoveFolderItem {
    id: LayerId,
    position: TreePosition,
    root_index: usize,
    children: Vec<LayerId>,
    /// The emptied folder, present while the removal is applied.
    shell: Option<LayerNode>,
}

impl RemoveFolderItem {
    pub fn new(id: LayerId, position: TreePosition, root_index: usize, children: Vec<LayerId>) -> Self {
        Self {
            id,
            position,
            root_index,
            children,
            shell: None,
        }
    }

    pub fn folder(&self) -> LayerId {
        self.id
    }

    /// Children orphaned to the root, bottom-most first.
    pub fn children(&self) -> &[LayerId] {
        &self.children
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        if let Some(mut shell) = self.shell.take() {
            let mut children = Vec::with_capacity(self.children.len());
            for id in &self.children {
                if let Some(child) = detach_node(state, *id) {
                    children.push(child);
                }
            }
            if let Some(folder) = shell.as_folder_mut() {
                for mut child in children {
                    child.base_mut().parent = Some(self.id);
                    folder.children.push(child);
                }
            }
            insert_node(state, self.position, shell);
        } else {
            tracing::warn!("Remove Folder: no stored folder to reinsert");
        }
        state.end_structure();
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        if let Some(mut shell) = detach_node(state, self.id) {
            let children = shell
                .as_folder_mut()
                .map(|f| std::mem::take(&mut f.children))
                .unwrap_or_default();
            for (offset, child) in children.into_iter().enumerate() {
                let position = TreePosition {
                    parent: None,
                    index: self.root_index + offset,
                };
                insert_node(state, position, child);
            }
            self.shell = Some(shell);
        }
        state.end_structure();
    }
}

/// A node moved within its sibling list.
#[derive(Debug)]
pub struct ReorderLayerItem {
    id: LayerId,
    from: usize,
    to: usize,
}

impl ReorderLayerItem {
    pub fn new(id: LayerId, from: usize, to: usize) -> Self {
        Self { id, from, to }
    }

    pub fn has_changes(&self) -> bool {
        self.from != self.to
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        self.apply(state, self.from);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        self.apply(state, self.to);
    }

    fn apply(&self, state: &mut DocumentState, index: usize) {
        state.begin_structure();
        if state.tree.reorder(self.id, index).is_none() {
            tracing::warn!("Layer {} is not in the tree", self.id);
        }
        state.end_structure();
    }
}

/// A node moved to another folder or to the root.
#[derive(Debug)]
pub struct MoveToFolderItem {
    id: LayerId,
    from: TreePosition,
    to: TreePosition,
}

impl MoveToFolderItem {
    /// `to.index` is the index in the destination after the node left its source.
    pub fn new(id: LayerId, from: TreePosition, to: TreePosition) -> Self {
        Self { id, from, to }
    }

    pub fn has_changes(&self) -> bool {
        self.from != self.to
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        self.apply(state, self.from);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        self.apply(state, self.to);
    }

    fn apply(&self, state: &mut DocumentState, position: TreePosition) {
        state.begin_structure();
        if let Some(node) = detach_node(state, self.id) {
            insert_node(state, position, node);
        }
        state.end_structure();
    }
}

/// A raster layer merged onto the raster layer directly below it.
///
/// The merged layer replaces the lower one. The upper layer is removed first
/// so the lower one's index stays valid.
#[derive(Debug)]
pub struct MergeDownItem {
    upper: LayerId,
    lower: LayerId,
    merged: LayerId,
    /// Parent and index of the lower layer; the upper sat at `index + 1`.
    position: TreePosition,
    /// (upper, lower) while the merge is applied.
    originals: Held<(LayerNode, LayerNode)>,
    /// The merged layer while the merge is undone.
    merged_node: Held<LayerNode>,
}

impl MergeDownItem {
    pub fn new(upper: LayerId, lower: LayerId, position: TreePosition, merged: LayerNode) -> Self {
        Self {
            upper,
            lower,
            merged: merged.id(),
            position,
            originals: Held::empty(),
            merged_node: Held::holding(merged),
        }
    }

    pub fn merged(&self) -> LayerId {
        self.merged
    }

    pub fn estimated_bytes(&self) -> usize {
        let originals = self
            .originals
            .resident()
            .map_or(0, |(a, b)| a.estimated_bytes() + b.estimated_bytes());
        originals + self.merged_node.resident().map_or(0, LayerNode::estimated_bytes)
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        if let Some((upper, lower)) = self.originals.take("Merge Down") {
            self.merged_node.put(detach_node(state, self.merged));
            insert_node(state, self.position, lower);
            let above = TreePosition {
                index: self.position.index + 1,
                ..self.position
            };
            insert_node(state, above, upper);
        }
        state.end_structure();
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        let Some(merged) = self.merged_node.take("Merge Down") else {
            state.end_structure();
            return;
        };
        let upper = detach_node(state, self.upper);
        let lower = detach_node(state, self.lower);
        if let (Some(upper), Some(lower)) = (upper, lower) {
            self.originals.put(Some((upper, lower)));
        }
        insert_node(state, self.position, merged);
        state.end_structure();
    }
}

/// A folder replaced by one raster layer holding its composite.
#[derive(Debug)]
pub struct FlattenFolderItem {
    folder: LayerId,
    flattened: LayerId,
    position: TreePosition,
    /// The folder subtree while the flatten is applied.
    folder_node: Held<LayerNode>,
    /// The flattened layer while the flatten is undone.
    flattened_node: Held<LayerNode>,
}

impl FlattenFolderItem {
    pub fn new(folder: LayerId, position: TreePosition, flattened: LayerNode) -> Self {
        Self {
            folder,
            flattened: flattened.id(),
            position,
            folder_node: Held::empty(),
            flattened_node: Held::holding(flattened),
        }
    }

    pub fn flattened(&self) -> LayerId {
        self.flattened
    }

    pub fn estimated_bytes(&self) -> usize {
        self.folder_node.resident().map_or(0, LayerNode::estimated_bytes)
            + self.flattened_node.resident().map_or(0, LayerNode::estimated_bytes)
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        if let Some(folder) = self.folder_node.take("Flatten Folder") {
            self.flattened_node.put(detach_node(state, self.flattened));
            insert_node(state, self.position, folder);
        }
        state.end_structure();
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        state.begin_structure();
        if let Some(flattened) = self.flattened_node.take("Flatten Folder") {
            self.folder_node.put(detach_node(state, self.folder));
            insert_node(state, self.position, flattened);
        }
        state.end_structure();
    }
}

/// Name, visibility, lock, opacity and blend mode of one node.
#[derive(Debug)]
pub struct LayerPropertiesItem {
    id: LayerId,
    before: LayerProperties,
    after: LayerProperties,
}

impl LayerPropertiesItem {
    pub fn new(id: LayerId, before: LayerProperties, after: LayerProperties) -> Self {
        Self { id, before, after }
    }

    pub fn has_changes(&self) -> bool {
        self.before != self.after
    }

    pub(crate) fn undo(&mut self, state: &mut DocumentState) {
        apply_properties(state, self.id, &self.before);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        apply_properties(state, self.id, &self.after);
    }
}

fn apply_properties(state: &mut DocumentState, id: LayerId, properties: &LayerProperties) {
    let Some(node) = state.tree.find_mut(id) else {
        tracing::warn!("Layer {id} is not in the tree");
        return;
    };
    properties.apply(node);
    state.layers_changed();
}
