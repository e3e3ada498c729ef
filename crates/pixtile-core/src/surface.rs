/// BGRA pixel surfaces shared by layers, tiles and the composite.
///
/// Pixels are stored row-major, four bytes each in B, G, R, A order. A pixel
/// is often handled as one packed `u32` (little-endian over those four bytes)
/// so that change detection is a single integer compare.
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// Bytes per BGRA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Packs a BGRA quad into the `u32` form used by pixel deltas.
pub fn pack(bgra: [u8; 4]) -> u32 {
    u32::from_le_bytes(bgra)
}

/// Inverse of [`pack`].
pub fn unpack(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Byte length of a `width` x `height` BGRA buffer.
pub fn buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// A rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clips the rectangle to a `width` x `height` area. Returns `None` when
    /// nothing is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        (w > 0 && h > 0).then(|| Rect::new(self.x, self.y, w, h))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A width x height BGRA buffer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl PixelSurface {
    /// Creates a fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    /// Creates a surface with every pixel set to `bgra`.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * BYTES_PER_PIXEL);
        for _ in 0..count {
            data.extend_from_slice(&bgra);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wraps an existing BGRA buffer.
    ///
    /// # Errors
    ///
    /// Returns `BufferSizeMismatch` if `data` is not exactly
    /// `width * height * 4` bytes long.
    pub fn from_bytes(width: u32, height: u32, data: Vec<u8>) -> Result<Self, DocumentError> {
        let expected = buffer_len(width, height);
        if data.len() != expected {
            return Err(DocumentError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Byte offset of pixel (x, y). The caller guarantees the pixel is in bounds.
    pub fn offset_of(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    /// Packed pixel at (x, y), or `None` out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.read_at(self.offset_of(x, y)))
    }

    /// Sets pixel (x, y). Out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u32) {
        if x < self.width && y < self.height {
            let offset = self.offset_of(x, y);
            self.write_at(offset, value);
        }
    }

    /// Packed pixel starting at byte `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` does not address a whole pixel inside the buffer.
    pub fn read_at(&self, offset: usize) -> u32 {
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        pack([px[0], px[1], px[2], px[3]])
    }

    /// Writes a packed pixel starting at byte `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` does not address a whole pixel inside the buffer.
    pub fn write_at(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&unpack(value));
    }

    /// Copies `rect` (clipped to the surface) out as a tightly packed buffer.
    pub fn read_rect(&self, rect: Rect) -> Vec<u8> {
        let Some(rect) = rect.clip(self.width, self.height) else {
            return Vec::new();
        };
        let row_bytes = rect.width as usize * BYTES_PER_PIXEL;
        let mut out = Vec::with_capacity(row_bytes * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let start = self.offset_of(rect.x, y);
            out.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        out
    }

    /// Writes a `src_width`-wide tightly packed buffer with its top-left
    /// corner at (x, y). Rows and columns falling outside the surface are
    /// skipped.
    pub fn write_rect(&mut self, x: u32, y: u32, src_width: u32, src: &[u8]) {
        if src_width == 0 {
            return;
        }
        let src_row_bytes = src_width as usize * BYTES_PER_PIXEL;
        let src_height = (src.len() / src_row_bytes) as u32;
        let Some(clip) = Rect::new(x, y, src_width, src_height).clip(self.width, self.height) else {
            return;
        };
        let copy_bytes = clip.width as usize * BYTES_PER_PIXEL;
        for row in 0..clip.height {
            let src_start = row as usize * src_row_bytes;
            let dst_start = self.offset_of(clip.x, clip.y + row);
            self.data[dst_start..dst_start + copy_bytes]
                .copy_from_slice(&src[src_start..src_start + copy_bytes]);
        }
    }

    /// Returns a copy resized to `width` x `height`, anchored at the top-left
    /// corner. New area is transparent.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let mut out = Self::new(width, height);
        out.write_rect(0, 0, self.width, &self.data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_is_bgra_little_endian() {
        assert_eq!(pack([1, 2, 3, 4]), 0x0403_0201);
        assert_eq!(unpack(0x0403_0201), [1, 2, 3, 4]);
    }

    #[test]
    fn test_filled_and_pixel_access() {
        let mut surface = PixelSurface::filled(3, 2, [10, 20, 30, 255]);
        assert_eq!(surface.bytes().len(), 24);
        assert_eq!(surface.pixel(2, 1), Some(pack([10, 20, 30, 255])));
        assert_eq!(surface.pixel(3, 0), None);

        surface.set_pixel(1, 1, 7);
        assert_eq!(surface.read_at(surface.offset_of(1, 1)), 7);
        surface.set_pixel(9, 9, 7);
    }

    #[test]
    fn test_from_bytes_checks_length() {
        let err = PixelSurface::from_bytes(2, 2, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            DocumentError::BufferSizeMismatch {
                expected: 16,
                actual: 15
            }
        );
        assert!(PixelSurface::from_bytes(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_rect_round_trip_with_clipping() {
        let mut surface = PixelSurface::new(4, 4);
        let patch = PixelSurface::filled(3, 3, [1, 1, 1, 1]);
        surface.write_rect(2, 2, 3, patch.bytes());

        assert_eq!(surface.pixel(1, 1), Some(0));
        assert_eq!(surface.pixel(2, 2), Some(pack([1, 1, 1, 1])));
        assert_eq!(surface.pixel(3, 3), Some(pack([1, 1, 1, 1])));

        let read = surface.read_rect(Rect::new(2, 2, 5, 5));
        assert_eq!(read.len(), 2 * 2 * 4);
    }

    #[test]
    fn test_clip() {
        assert_eq!(Rect::new(0, 0, 10, 10).clip(4, 3), Some(Rect::new(0, 0, 4, 3)));
        assert_eq!(Rect::new(4, 0, 1, 1).clip(4, 3), None);
        assert_eq!(Rect::new(1, 1, 0, 5).clip(4, 3), None);
    }

    #[test]
    fn test_resized_anchors_top_left() {
        let mut surface = PixelSurface::new(2, 2);
        surface.set_pixel(1, 1, 9);
        let bigger = surface.resized(3, 3);
        assert_eq!(bigger.pixel(1, 1), Some(9));
        assert_eq!(bigger.pixel(2, 2), Some(0));

        let smaller = surface.resized(1, 1);
        assert_eq!(smaller.bytes(), &[0, 0, 0, 0]);
    }
}
