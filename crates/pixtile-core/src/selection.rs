/// Pixel selection and its floating transform.
use serde::{Deserialize, Serialize};

use crate::surface::{PixelSurface, Rect};

/// Per-pixel selection membership.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl std::fmt::Debug for SelectionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionMask")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("selected", &self.count())
            .finish()
    }
}

impl SelectionMask {
    /// Creates an empty selection.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
        }
    }

    /// Creates a selection covering `rect`, clipped to the canvas.
    pub fn from_rect(width: u32, height: u32, rect: Rect) -> Self {
        let mut mask = Self::new(width, height);
        if let Some(rect) = rect.clip(width, height) {
            for y in rect.y..rect.y + rect.height {
                for x in rect.x..rect.x + rect.width {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.cells[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, selected: bool) {
        if x < self.width && y < self.height {
            let index = self.index(x, y);
            self.cells[index] = selected;
        }
    }

    /// Number of selected pixels.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.contains(&true)
    }

    /// Smallest rectangle holding every selected pixel.
    pub fn bounds(&self) -> Option<Rect> {
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0, 0);
        let mut any = false;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.cells[self.index(x, y)] {
                    any = true;
                    min = (min.0.min(x), min.1.min(y));
                    max = (max.0.max(x), max.1.max(y));
                }
            }
        }
        any.then(|| Rect::new(min.0, min.1, max.0 - min.0 + 1, max.1 - min.1 + 1))
    }

    /// Copy resized to `width` x `height`, anchored top-left.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let mut out = Self::new(width, height);
        for y in 0..self.height.min(height) {
            for x in 0..self.width.min(width) {
                out.set(x, y, self.contains(x, y));
            }
        }
        out
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Scalar transform applied to the floating selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    pub offset_x: i32,
    pub offset_y: i32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation_degrees: f32,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            offset_x: 0,
            offset_y: 0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_degrees: 0.0,
        }
    }
}

impl TransformParams {
    /// Whether committing these params resamples pixels. Pure translation
    /// doesn't; scale and rotation bake into the floating buffer.
    pub fn resamples(&self) -> bool {
        self.scale_x != 1.0 || self.scale_y != 1.0 || self.rotation_degrees % 360.0 != 0.0
    }
}

/// The floating selection: its transform and, once a resampling transform
/// has been baked, the resulting pixels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FloatingSelection {
    pub params: TransformParams,
    pub buffer: Option<PixelSurface>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_selection_bounds() {
        let mask = SelectionMask::from_rect(8, 8, Rect::new(2, 3, 10, 2));
        assert_eq!(mask.count(), 6 * 2);
        assert_eq!(mask.bounds(), Some(Rect::new(2, 3, 6, 2)));
        assert!(mask.contains(7, 4));
        assert!(!mask.contains(7, 5));
    }

    #[test]
    fn test_equality_is_per_pixel() {
        let mut a = SelectionMask::from_rect(4, 4, Rect::new(0, 0, 2, 2));
        let b = a.clone();
        a.set(1, 0, false);
        a.set(0, 1, false);
        a.set(1, 1, true);
        // Same bounds, different content
        assert_eq!(a.bounds(), Some(Rect::new(0, 0, 2, 2)));
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_and_resize() {
        let mask = SelectionMask::new(3, 3);
        assert!(mask.is_empty());
        assert_eq!(mask.bounds(), None);

        let full = SelectionMask::from_rect(2, 2, Rect::new(0, 0, 2, 2));
        let grown = full.resized(3, 3);
        assert_eq!(grown.count(), 4);
        assert!(!grown.contains(2, 2));
    }

    #[test]
    fn test_translation_does_not_resample() {
        let moved = TransformParams {
            offset_x: 4,
            ..TransformParams::default()
        };
        assert!(!moved.resamples());
        let rotated = TransformParams {
            rotation_degrees: 90.0,
            ..TransformParams::default()
        };
        assert!(rotated.resamples());
    }
}
