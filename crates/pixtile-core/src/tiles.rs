/// Tile catalog: reusable fixed-size pixel buffers referenced by id.
use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;

use pixtile_mod_history::EventBus;
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::surface::buffer_len;

/// Catalog-assigned tile identifier. Ids start at 1 and are never reused
/// within a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId(pub u32);

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Catalog change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileSetEvent {
    Added(TileId),
    Removed(TileId),
    Updated(TileId),
    Cleared,
}

/// One reusable tile. The id and size are fixed; the pixels are not.
#[derive(Clone, PartialEq, Eq)]
pub struct TileDefinition {
    id: TileId,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for TileDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileDefinition")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl TileDefinition {
    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// BGRA pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Id-indexed store of tile definitions sharing one tile size.
pub struct TileSet {
    tile_width: u32,
    tile_height: u32,
    tiles: BTreeMap<TileId, TileDefinition>,
    next_id: u32,
    events: EventBus<TileSetEvent>,
}

impl std::fmt::Debug for TileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSet")
            .field("tile_width", &self.tile_width)
            .field("tile_height", &self.tile_height)
            .field("tiles", &self.tiles.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl TileSet {
    /// Creates an empty catalog for `tile_width` x `tile_height` tiles.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` if either size is zero.
    pub fn new(tile_width: u32, tile_height: u32) -> Result<Self, DocumentError> {
        if tile_width == 0 || tile_height == 0 {
            return Err(DocumentError::InvalidDimensions {
                width: tile_width,
                height: tile_height,
            });
        }
        Ok(Self {
            tile_width,
            tile_height,
            tiles: BTreeMap::new(),
            next_id: 1,
            events: EventBus::new(),
        })
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    /// Byte length every tile buffer must have.
    pub fn tile_len(&self) -> usize {
        buffer_len(self.tile_width, self.tile_height)
    }

    /// Subscribes to catalog changes.
    pub fn subscribe(&mut self) -> Receiver<TileSetEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, id: TileId) -> Option<&TileDefinition> {
        self.tiles.get(&id)
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains_key(&id)
    }

    /// Tiles in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TileDefinition> {
        self.tiles.values()
    }

    /// The id the next `add` will assign.
    pub fn next_id(&self) -> TileId {
        TileId(self.next_id)
    }

    /// Adds a tile and assigns it the next id.
    ///
    /// # Errors
    ///
    /// Returns `BufferSizeMismatch` if `pixels` does not match the tile size.
    pub fn add(&mut self, pixels: Vec<u8>) -> Result<TileId, DocumentError> {
        self.check_len(&pixels)?;
        let id = TileId(self.next_id);
        self.next_id += 1;
        self.store(id, pixels);
        Ok(id)
    }

    /// Adds a tile under a caller-chosen id, as when loading a saved catalog
    /// or undoing a removal. Later `add` calls never hand out an id at or
    /// below it.
    ///
    /// # Errors
    ///
    /// Returns `BufferSizeMismatch` on a wrong buffer size, or `InvalidRecord`
    /// if the id is taken.
    pub fn insert_with_id(&mut self, id: TileId, pixels: Vec<u8>) -> Result<(), DocumentError> {
        self.check_len(&pixels)?;
        if self.tiles.contains_key(&id) {
            return Err(DocumentError::InvalidRecord(format!("duplicate tile id {id}")));
        }
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        self.store(id, pixels);
        Ok(())
    }

    /// Replaces a tile's pixels in place, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns `TileNotFound` or `BufferSizeMismatch`; the tile is untouched then.
    pub fn update(&mut self, id: TileId, pixels: &[u8]) -> Result<(), DocumentError> {
        self.check_len(pixels)?;
        let tile = self.tiles.get_mut(&id).ok_or(DocumentError::TileNotFound(id))?;
        tile.pixels.copy_from_slice(pixels);
        self.events.emit(TileSetEvent::Updated(id));
        Ok(())
    }

    /// Removes a tile. Its id stays retired.
    pub fn remove(&mut self, id: TileId) -> Option<TileDefinition> {
        let removed = self.tiles.remove(&id)?;
        self.events.emit(TileSetEvent::Removed(id));
        Some(removed)
    }

    /// Removes every tile. Ids stay retired.
    pub fn clear(&mut self) {
        self.tiles.clear();
        self.events.emit(TileSetEvent::Cleared);
    }

    fn store(&mut self, id: TileId, pixels: Vec<u8>) {
        let tile = TileDefinition {
            id,
            width: self.tile_width,
            height: self.tile_height,
            pixels,
        };
        self.tiles.insert(id, tile);
        self.events.emit(TileSetEvent::Added(id));
    }

    fn check_len(&self, pixels: &[u8]) -> Result<(), DocumentError> {
        let expected = self.tile_len();
        if pixels.len() != expected {
            return Err(DocumentError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(set: &TileSet, value: u8) -> Vec<u8> {
        vec![value; set.tile_len()]
    }

    #[test]
    fn test_ids_are_monotonic_and_not_reused() {
        let mut set = TileSet::new(2, 2).expect("set");
        let a = set.add(solid(&set, 1)).expect("add");
        let b = set.add(solid(&set, 2)).expect("add");
        assert_eq!((a, b), (TileId(1), TileId(2)));

        set.remove(b);
        let c = set.add(solid(&set, 3)).expect("add");
        assert_eq!(c, TileId(3));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rejects_wrong_sizes() {
        assert!(TileSet::new(0, 4).is_err());
        let mut set = TileSet::new(2, 2).expect("set");
        assert!(matches!(
            set.add(vec![0; 3]),
            Err(DocumentError::BufferSizeMismatch { expected: 16, actual: 3 })
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn test_update_in_place_keeps_identity() {
        let mut set = TileSet::new(1, 1).expect("set");
        let id = set.add(vec![0, 0, 0, 0]).expect("add");
        set.update(id, &[1, 2, 3, 4]).expect("update");
        let tile = set.get(id).expect("tile");
        assert_eq!(tile.id(), id);
        assert_eq!(tile.pixels(), &[1, 2, 3, 4]);
        assert_eq!(
            set.update(TileId(9), &[0; 4]),
            Err(DocumentError::TileNotFound(TileId(9)))
        );
    }

    #[test]
    fn test_insert_with_id_advances_counter() {
        let mut set = TileSet::new(1, 1).expect("set");
        set.insert_with_id(TileId(5), vec![0; 4]).expect("insert");
        assert!(set.insert_with_id(TileId(5), vec![0; 4]).is_err());
        assert_eq!(set.add(vec![0; 4]).expect("add"), TileId(6));
    }

    #[test]
    fn test_events_in_order() {
        let mut set = TileSet::new(1, 1).expect("set");
        let rx = set.subscribe();
        let id = set.add(vec![0; 4]).expect("add");
        set.update(id, &[1; 4]).expect("update");
        set.remove(id);
        set.clear();

        let events: Vec<TileSetEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                TileSetEvent::Added(id),
                TileSetEvent::Updated(id),
                TileSetEvent::Removed(id),
                TileSetEvent::Cleared,
            ]
        );
    }
}
