//! Selection and canvas-size operations.

use crate::document::CanvasDocument;
use crate::error::DocumentError;
use crate::history::{
    CanvasSnapshot, HistoryItem, ResizeCanvasItem, SelectionChangeItem, SelectionTransformItem,
};
use crate::selection::{FloatingSelection, SelectionMask, TransformParams};
use crate::surface::{PixelSurface, Rect};

impl CanvasDocument {
    /// Replaces the selection. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` if the mask isn't canvas-sized.
    pub fn set_selection(&mut self, mask: SelectionMask) -> Result<bool, DocumentError> {
        if mask.width() != self.state.width || mask.height() != self.state.height {
            return Err(DocumentError::InvalidDimensions {
                width: mask.width(),
                height: mask.height(),
            });
        }
        let before = self.state.selection.clone();
        Ok(self.commit(HistoryItem::SelectionChange(SelectionChangeItem::new(before, mask))))
    }

    /// Selects `rect`, clipped to the canvas, replacing the selection.
    pub fn select_rect(&mut self, rect: Rect) -> bool {
        let mask = SelectionMask::from_rect(self.state.width, self.state.height, rect);
        let before = self.state.selection.clone();
        self.commit(HistoryItem::SelectionChange(SelectionChangeItem::new(before, mask)))
    }

    /// Drops the selection.
    pub fn clear_selection(&mut self) -> bool {
        let mask = SelectionMask::new(self.state.width, self.state.height);
        let before = self.state.selection.clone();
        self.commit(HistoryItem::SelectionChange(SelectionChangeItem::new(before, mask)))
    }

    /// Commits a transform of the floating selection. For a scale or
    /// rotation, `baked` carries the resampled pixels; a pure translation
    /// keeps the current buffer.
    pub fn transform_selection(
        &mut self,
        params: TransformParams,
        baked: Option<PixelSurface>,
    ) -> bool {
        let before = self.state.floating.clone();
        let buffer = match baked {
            Some(buffer) if params.resamples() => Some(buffer),
            _ => before.buffer.clone(),
        };
        let after = FloatingSelection { params, buffer };
        self.commit(HistoryItem::SelectionTransform(SelectionTransformItem::new(
            before, after,
        )))
    }

    /// Resizes the canvas, anchored top-left. Raster surfaces, masks, tile
    /// mappings and the selection follow; reference overlays keep their size.
    /// Returns whether the size changed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` for a zero width or height.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, DocumentError> {
        if width == 0 || height == 0 {
            return Err(DocumentError::InvalidDimensions { width, height });
        }
        let (tile_width, tile_height) = self.tile_size();
        let before = CanvasSnapshot::capture(&self.state);
        let after = before.resized(width, height, tile_width, tile_height);
        tracing::info!(
            "Resizing canvas {}x{} -> {width}x{height}",
            before.width,
            before.height
        );
        Ok(self.commit(HistoryItem::ResizeCanvas(ResizeCanvasItem::new(before, after))))
    }
}

#[cfg(test)]
mod tests {
    use crate::document::{CanvasDocument, DocumentEvent};
    use crate::error::DocumentError;
    use crate::layer::LayerId;
    use crate::selection::{SelectionMask, TransformParams};
    use crate::surface::{pack, PixelSurface, Rect};

    #[test]
    fn test_selection_change_round_trip() {
        let mut doc = CanvasDocument::new(4, 4, 2, 2).expect("doc");
        assert!(doc.select_rect(Rect::new(1, 1, 2, 2)));
        assert_eq!(doc.selection().count(), 4);
        assert!(!doc.select_rect(Rect::new(1, 1, 2, 2)));
        assert!(doc.undo());
        assert!(doc.selection().is_empty());
        assert!(doc.redo());
        assert!(doc.selection().contains(2, 2));
    }

    #[test]
    fn test_set_selection_rejects_wrong_size() {
        let mut doc = CanvasDocument::new(4, 4, 2, 2).expect("doc");
        assert_eq!(
            doc.set_selection(SelectionMask::new(3, 4)),
            Err(DocumentError::InvalidDimensions {
                width: 3,
                height: 4
            })
        );
    }

    #[test]
    fn test_translation_keeps_buffer_and_scale_bakes() {
        let mut doc = CanvasDocument::new(4, 4, 2, 2).expect("doc");
        let moved = TransformParams {
            offset_x: 2,
            ..TransformParams::default()
        };
        let baked = PixelSurface::filled(2, 2, [1, 2, 3, 255]);
        assert!(doc.transform_selection(moved, Some(baked.clone())));
        assert!(doc.floating_selection().buffer.is_none());

        let scaled = TransformParams {
            scale_x: 2.0,
            ..moved
        };
        assert!(doc.transform_selection(scaled, Some(baked.clone())));
        assert_eq!(doc.floating_selection().buffer, Some(baked));

        assert!(doc.undo());
        assert_eq!(doc.floating_selection().params, moved);
        assert!(doc.floating_selection().buffer.is_none());
    }

    #[test]
    fn test_resize_round_trip() {
        let mut doc = CanvasDocument::new(4, 4, 2, 2).expect("doc");
        let events = doc.subscribe();
        doc.commit_pixels(LayerId(1), Rect::new(3, 3, 1, 1), &[5, 5, 5, 255])
            .expect("paint");
        assert!(doc.resize(2, 3).expect("resize"));
        assert_eq!((doc.width(), doc.height()), (2, 3));
        assert_eq!(doc.raster(LayerId(1)).expect("layer").surface.width(), 2);
        assert!(events
            .try_iter()
            .any(|e| e == DocumentEvent::CanvasResized { width: 2, height: 3 }));

        assert!(doc.undo());
        assert_eq!((doc.width(), doc.height()), (4, 4));
        assert_eq!(
            doc.raster(LayerId(1)).expect("layer").surface.pixel(3, 3),
            Some(pack([5, 5, 5, 255]))
        );
        assert_eq!(doc.composite().width(), 4);
    }

    #[test]
    fn test_resize_rejects_zero_before_mutation() {
        let mut doc = CanvasDocument::new(4, 4, 2, 2).expect("doc");
        assert_eq!(
            doc.resize(0, 4),
            Err(DocumentError::InvalidDimensions {
                width: 0,
                height: 4
            })
        );
        assert_eq!(doc.width(), 4);
        assert!(!doc.resize(4, 4).expect("same size"));
    }
}
