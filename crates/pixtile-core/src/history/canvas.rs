//! Canvas resize history item.

use pixtile_mod_history::{Offloadable, OffloadService};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentEvent, DocumentState};
use crate::layer::{LayerId, LayerMask};
use crate::mapping::TileMapping;
use crate::selection::SelectionMask;
use crate::surface::PixelSurface;

/// One raster layer's size-dependent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPixels {
    pub layer: LayerId,
    pub surface: PixelSurface,
    pub mask: Option<LayerMask>,
    pub mapping: Option<TileMapping>,
}

/// Everything a resize rewrites, at one canvas size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<LayerPixels>,
    pub selection: SelectionMask,
}

impl CanvasSnapshot {
    /// Captures the current canvas.
    pub fn capture(state: &DocumentState) -> Self {
        let layers = state
            .tree
            .raster_layers()
            .into_iter()
            .map(|layer| LayerPixels {
                layer: layer.base.id,
                surface: layer.surface.clone(),
                mask: layer.mask.clone(),
                mapping: layer.mapping.clone(),
            })
            .collect();
        Self {
            width: state.width,
            height: state.height,
            layers,
            selection: state.selection.clone(),
        }
    }

    /// The snapshot `capture` would return after resizing to
    /// `width` x `height` anchored at the top-left corner.
    pub fn resized(&self, width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        let (columns, rows) = crate::mapping::grid_size(width, height, tile_width, tile_height);
        let layers = self
            .layers
            .iter()
            .map(|layer| LayerPixels {
                layer: layer.layer,
                surface: layer.surface.resized(width, height),
                mask: layer.mask.as_ref().map(|m| m.resized(width, height)),
                mapping: layer.mapping.as_ref().map(|m| m.resized(columns, rows)),
            })
            .collect();
        Self {
            width,
            height,
            layers,
            selection: self.selection.resized(width, height),
        }
    }

    fn restore(&self, state: &mut DocumentState) {
        state.width = self.width;
        state.height = self.height;
        state.selection = self.selection.clone();
        for saved in &self.layers {
            let Ok(layer) = state.tree.raster_mut(saved.layer) else {
                tracing::warn!("Resize target {} is gone, skipping", saved.layer);
                continue;
            };
            layer.surface = saved.surface.clone();
            layer.mask = saved.mask.clone();
            layer.mapping = saved.mapping.clone();
        }
        state.composite = PixelSurface::new(self.width, self.height);
        state.composite_stale = true;
        state.notify(DocumentEvent::CanvasResized {
            width: self.width,
            height: self.height,
        });
        state.notify(DocumentEvent::LayersChanged);
    }

    fn estimated_bytes(&self) -> usize {
        self.layers
            .iter()
            .map(|l| {
                l.surface.bytes().len()
                    + l.mask.as_ref().map_or(0, |m| m.alpha().len())
                    + l.mapping
                        .as_ref()
                        .map_or(0, |m| m.columns() as usize * m.rows() as usize * 8)
            })
            .sum::<usize>()
            + self.selection.width() as usize * self.selection.height() as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizePayload {
    pub before: CanvasSnapshot,
    pub after: CanvasSnapshot,
}

/// Canvas resize, anchored top-left.
#[derive(Debug)]
pub struct ResizeCanvasItem {
    payload: Offloadable<ResizePayload>,
    changed: bool,
    estimated: usize,
}

impl ResizeCanvasItem {
    pub fn new(before: CanvasSnapshot, after: CanvasSnapshot) -> Self {
        let changed = before.width != after.width || before.height != after.height;
        let estimated = before.estimated_bytes() + after.estimated_bytes();
        Self {
            payload: Offloadable::new(ResizePayload { before, after }),
            changed,
            estimated,
        }
    }

    pub fn payload(&self) -> Option<&ResizePayload> {
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
        self.resident().before.restore(state);
    }

    pub(crate) fn redo(&mut self, state: &mut DocumentState) {
        self.resident().after.restore(state);
    }

    fn resident(&self) -> &ResizePayload {
        match self.payload.get() {
            Some(payload) => payload,
            None => panic!("canvas resize replayed while offloaded"),
        }
    }
}
