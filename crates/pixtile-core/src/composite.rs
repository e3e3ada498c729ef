/// Source-over compositing of raster layers.
///
/// This is the plain alpha pass used for the document composite and for
/// merge-down / flatten-folder. Blend modes other than `Normal` are treated
/// as `Normal`.
use rayon::prelude::*;

use crate::layer::{LayerMask, RasterLayer};
use crate::surface::{PixelSurface, BYTES_PER_PIXEL};

/// One layer's contribution to a composite.
#[derive(Clone, Copy)]
pub struct CompositeSource<'a> {
    pub surface: &'a PixelSurface,
    pub opacity: f32,
    pub mask: Option<&'a LayerMask>,
}

impl<'a> CompositeSource<'a> {
    pub fn from_layer(layer: &'a RasterLayer) -> Self {
        Self {
            surface: &layer.surface,
            opacity: layer.opacity,
            mask: layer.mask.as_ref(),
        }
    }
}

/// Composites `top` over `base` (both straight-alpha BGRA) with an extra
/// coverage factor `opacity` in 0..=1.
pub fn blend_over(base: [u8; 4], top: [u8; 4], opacity: f32) -> [u8; 4] {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if opacity >= 1.0 && top[3] == u8::MAX {
        return top;
    }

    let top_a = top[3] as f32 / 255.0 * opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for channel in 0..3 {
        let t = top[channel] as f32 / 255.0;
        let b = base[channel] as f32 / 255.0;
        let value = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[channel] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

/// Composites `sources` bottom to top onto `target`, row by row in parallel.
/// Source pixels outside a source's bounds contribute nothing.
pub fn composite_onto(target: &mut PixelSurface, sources: &[CompositeSource<'_>]) {
    let width = target.width() as usize;
    if width == 0 {
        return;
    }
    let row_bytes = width * BYTES_PER_PIXEL;
    target
        .bytes_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for source in sources {
                if y >= source.surface.height() {
                    continue;
                }
                let columns = width.min(source.surface.width() as usize);
                for x in 0..columns {
                    let x32 = x as u32;
                    let Some(packed) = source.surface.pixel(x32, y) else {
                        continue;
                    };
                    let coverage = match source.mask {
                        Some(mask) => source.opacity * (mask.get(x32, y) as f32 / 255.0),
                        None => source.opacity,
                    };
                    let offset = x * BYTES_PER_PIXEL;
                    let px = &mut row[offset..offset + BYTES_PER_PIXEL];
                    let blended = blend_over([px[0], px[1], px[2], px[3]], packed.to_le_bytes(), coverage);
                    px.copy_from_slice(&blended);
                }
            }
        });
}

/// Composites `sources` onto a fresh transparent `width` x `height` surface.
pub fn composite(width: u32, height: u32, sources: &[CompositeSource<'_>]) -> PixelSurface {
    let mut out = PixelSurface::new(width, height);
    composite_onto(&mut out, sources);
    out
}
