/// Owned layer forest with parent back-references kept as ids.
///
/// A node lives in exactly one child list: the root list or a folder's
/// `children`. `LayerBase::parent` mirrors that placement; `insert` rewrites
/// it for the inserted node, and its descendants keep theirs.
use crate::error::DocumentError;
use crate::layer::{LayerId, LayerNode, RasterLayer};

/// Where a node sits: its parent (or root) and its index among siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreePosition {
    pub parent: Option<LayerId>,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerTree {
    roots: Vec<LayerNode>,
}

impl LayerTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root nodes, bottom-most first.
    pub fn roots(&self) -> &[LayerNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total node count, folders included.
    pub fn len(&self) -> usize {
        self.flatten().len()
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.find(id).is_some()
    }

    pub fn find(&self, id: LayerId) -> Option<&LayerNode> {
        find_in(&self.roots, id)
    }

    pub fn find_mut(&mut self, id: LayerId) -> Option<&mut LayerNode> {
        find_in_mut(&mut self.roots, id)
    }

    /// # Errors
    ///
    /// Returns `LayerNotFound` or `NotARasterLayer`.
    pub fn raster(&self, id: LayerId) -> Result<&RasterLayer, DocumentError> {
        self.find(id)
            .ok_or(DocumentError::LayerNotFound(id))?
            .as_raster()
            .ok_or(DocumentError::NotARasterLayer(id))
    }

    /// # Errors
    ///
    /// Returns `LayerNotFound` or `NotARasterLayer`.
    pub fn raster_mut(&mut self, id: LayerId) -> Result<&mut RasterLayer, DocumentError> {
        self.find_mut(id)
            .ok_or(DocumentError::LayerNotFound(id))?
            .as_raster_mut()
            .ok_or(DocumentError::NotARasterLayer(id))
    }

    pub fn position(&self, id: LayerId) -> Option<TreePosition> {
        let parent = self.find(id)?.base().parent;
        let index = self.siblings(parent)?.iter().position(|n| n.id() == id)?;
        Some(TreePosition { parent, index })
    }

    /// The child list of `parent`, or the root list for `None`.
    pub fn siblings(&self, parent: Option<LayerId>) -> Option<&Vec<LayerNode>> {
        match parent {
            None => Some(&self.roots),
            Some(id) => self.find(id)?.as_folder().map(|f| &f.children),
        }
    }

    fn siblings_mut(&mut self, parent: Option<LayerId>) -> Option<&mut Vec<LayerNode>> {
        match parent {
            None => Some(&mut self.roots),
            Some(id) => self.find_mut(id)?.as_folder_mut().map(|f| &mut f.children),
        }
    }

    /// Inserts `node` into `parent`'s child list at `index`, clamped to the
    /// list length, and points the node's parent reference at it.
    ///
    /// # Errors
    ///
    /// Returns `LayerNotFound` or `NotAFolder` for a bad parent.
    pub fn insert(
        &mut self,
        parent: Option<LayerId>,
        index: usize,
        mut node: LayerNode,
    ) -> Result<(), DocumentError> {
        let siblings = match parent {
            None => &mut self.roots,
            Some(id) => match self.find_mut(id) {
                None => return Err(DocumentError::LayerNotFound(id)),
                Some(LayerNode::Folder(folder)) => &mut folder.children,
                Some(_) => return Err(DocumentError::NotAFolder(id)),
            },
        };
        node.base_mut().parent = parent;
        let index = index.min(siblings.len());
        siblings.insert(index, node);
        Ok(())
    }

    /// Removes a node with its subtree and reports where it was.
    pub fn detach(&mut self, id: LayerId) -> Option<(LayerNode, TreePosition)> {
        let position = self.position(id)?;
        let siblings = self.siblings_mut(position.parent)?;
        let node = siblings.remove(position.index);
        Some((node, position))
    }

    /// Moves a node to `to` within its current sibling list.
    pub fn reorder(&mut self, id: LayerId, to: usize) -> Option<TreePosition> {
        let position = self.position(id)?;
        let siblings = self.siblings_mut(position.parent)?;
        let node = siblings.remove(position.index);
        let to = to.min(siblings.len());
        siblings.insert(to, node);
        Some(position)
    }

    /// Whether `ancestor` is `id` itself or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: LayerId, id: LayerId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.find(cur).and_then(|n| n.base().parent);
        }
        false
    }

    /// The root-level node containing `id` (itself when at the root).
    pub fn top_level_ancestor(&self, id: LayerId) -> Option<LayerId> {
        let mut current = self.find(id)?;
        while let Some(parent) = current.base().parent {
            current = self.find(parent)?;
        }
        Some(current.id())
    }

    /// Visible only if the node and every ancestor are visible.
    pub fn effective_visible(&self, id: LayerId) -> bool {
        self.all_ancestors(id, |n| n.base().visible)
    }

    /// Locked if the node or any ancestor is locked.
    pub fn effective_locked(&self, id: LayerId) -> bool {
        !self.all_ancestors(id, |n| !n.base().locked)
    }

    fn all_ancestors(&self, id: LayerId, predicate: impl Fn(&LayerNode) -> bool) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(node) = self.find(cur) else {
                return false;
            };
            if !predicate(node) {
                return false;
            }
            current = node.base().parent;
        }
        true
    }

    /// Every node depth-first, bottom to top; a folder precedes its children.
    pub fn flatten(&self) -> Vec<&LayerNode> {
        let mut out = Vec::new();
        flatten_into(&self.roots, &mut out);
        out
    }

    /// Raster layers in draw order, bottom to top.
    pub fn raster_layers(&self) -> Vec<&RasterLayer> {
        self.flatten().into_iter().filter_map(LayerNode::as_raster).collect()
    }

    /// Mutable raster layers, in the same order as `raster_layers`.
    pub fn raster_layers_mut(&mut self) -> Vec<&mut RasterLayer> {
        let mut out = Vec::new();
        collect_rasters_mut(&mut self.roots, &mut out);
        out
    }

    /// Largest id in the tree.
    pub fn max_id(&self) -> Option<LayerId> {
        self.flatten().into_iter().map(LayerNode::id).max()
    }
}

fn find_in(nodes: &[LayerNode], id: LayerId) -> Option<&LayerNode> {
    for node in nodes {
        if node.id() == id {
            return Some(node);
        }
        if let Some(found) = find_in(node.children(), id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut(nodes: &mut [LayerNode], id: LayerId) -> Option<&mut LayerNode> {
    for node in nodes {
        if node.id() == id {
            return Some(node);
        }
        if let LayerNode::Folder(folder) = node {
            if let Some(found) = find_in_mut(&mut folder.children, id) {
                return Some(found);
            }
        }
    }
    None
}

fn flatten_into<'a>(nodes: &'a [LayerNode], out: &mut Vec<&'a LayerNode>) {
    for node in nodes {
        out.push(node);
        flatten_into(node.children(), out);
    }
}

fn collect_rasters_mut<'a>(nodes: &'a mut [LayerNode], out: &mut Vec<&'a mut RasterLayer>) {
    for node in nodes {
        match node {
            LayerNode::Raster(layer) => out.push(layer),
            LayerNode::Folder(folder) => collect_rasters_mut(&mut folder.children, out),
            LayerNode::Reference(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerFolder, ReferenceLayer};
    use crate::surface::PixelSurface;

    fn raster(id: u64) -> LayerNode {
        LayerNode::Raster(RasterLayer::new(LayerId(id), format!("Layer {id}"), PixelSurface::new(1, 1)))
    }

    fn folder(id: u64) -> LayerNode {
        LayerNode::Folder(LayerFolder::new(LayerId(id), format!("Folder {id}")))
    }

    /// root: [1, F2[3, F4[5]], 6]
    fn sample() -> LayerTree {
        let mut tree = LayerTree::new();
        tree.insert(None, 0, raster(1)).expect("insert");
        tree.insert(None, 1, folder(2)).expect("insert");
        tree.insert(Some(LayerId(2)), 0, raster(3)).expect("insert");
        tree.insert(Some(LayerId(2)), 1, folder(4)).expect("insert");
        tree.insert(Some(LayerId(4)), 0, raster(5)).expect("insert");
        tree.insert(None, 9, raster(6)).expect("insert");
        tree
    }

    fn ids(tree: &LayerTree) -> Vec<u64> {
        tree.flatten().iter().map(|n| n.id().0).collect()
    }

    #[test]
    fn test_flatten_is_depth_first_bottom_to_top() {
        let tree = sample();
        assert_eq!(ids(&tree), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(tree.len(), 6);
        let rasters: Vec<u64> = tree.raster_layers().iter().map(|l| l.base.id.0).collect();
        assert_eq!(rasters, vec![1, 3, 5, 6]);
    }

    #[test]
    fn test_parent_references_follow_insert() {
        let tree = sample();
        assert_eq!(tree.find(LayerId(5)).map(|n| n.base().parent), Some(Some(LayerId(4))));
        assert_eq!(
            tree.position(LayerId(4)),
            Some(TreePosition {
                parent: Some(LayerId(2)),
                index: 1
            })
        );
        assert_eq!(tree.top_level_ancestor(LayerId(5)), Some(LayerId(2)));
        assert_eq!(tree.top_level_ancestor(LayerId(6)), Some(LayerId(6)));
    }

    #[test]
    fn test_insert_into_non_folder_fails() {
        let mut tree = sample();
        assert_eq!(
            tree.insert(Some(LayerId(1)), 0, raster(7)),
            Err(DocumentError::NotAFolder(LayerId(1)))
        );
        assert_eq!(
            tree.insert(Some(LayerId(99)), 0, raster(7)),
            Err(DocumentError::LayerNotFound(LayerId(99)))
        );
        assert!(!tree.contains(LayerId(7)));
    }

    #[test]
    fn test_detach_moves_whole_subtree() {
        let mut tree = sample();
        let (node, position) = tree.detach(LayerId(2)).expect("detach");
        assert_eq!(position, TreePosition { parent: None, index: 1 });
        assert_eq!(ids(&tree), vec![1, 6]);
        assert!(node.as_folder().is_some_and(|f| f.children.len() == 2));

        tree.insert(position.parent, position.index, node).expect("reinsert");
        assert_eq!(ids(&tree), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_reorder() {
        let mut tree = sample();
        tree.reorder(LayerId(1), 2);
        assert_eq!(ids(&tree), vec![2, 3, 4, 5, 6, 1]);
    }

    #[test]
    fn test_effective_flags_are_anded() {
        let mut tree = sample();
        if let Some(node) = tree.find_mut(LayerId(2)) {
            node.base_mut().visible = false;
            node.base_mut().locked = true;
        }
        assert!(!tree.effective_visible(LayerId(5)));
        assert!(tree.effective_locked(LayerId(5)));
        assert!(tree.effective_visible(LayerId(6)));
        assert!(!tree.effective_locked(LayerId(1)));
        // Stored flags on the child are untouched
        assert!(tree.find(LayerId(5)).is_some_and(|n| n.base().visible));
    }

    #[test]
    fn test_ancestry() {
        let tree = sample();
        assert!(tree.is_ancestor_or_self(LayerId(2), LayerId(5)));
        assert!(tree.is_ancestor_or_self(LayerId(5), LayerId(5)));
        assert!(!tree.is_ancestor_or_self(LayerId(5), LayerId(2)));
    }

    #[test]
    fn test_reference_layers_are_not_rasters() {
        let mut tree = LayerTree::new();
        let reference = ReferenceLayer::new(LayerId(1), "Sketch", PixelSurface::new(1, 1));
        tree.insert(None, 0, LayerNode::Reference(reference)).expect("insert");
        assert!(tree.raster_layers().is_empty());
        assert_eq!(tree.raster(LayerId(1)), Err(DocumentError::NotARasterLayer(LayerId(1))));
    }
}
