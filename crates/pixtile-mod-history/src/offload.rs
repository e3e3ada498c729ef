/// Blob store that lets heavy history entries release their buffers.
///
/// Blobs are keyed by random `Uuid`s and written as one file each inside a
/// per-session temporary directory that is removed when the store is dropped.
/// The index is a `DashMap`, so a housekeeping thread can write blobs while
/// the editing thread reads and removes others.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::TempDir;
use uuid::Uuid;

/// Binary blob storage for offloaded history data.
pub trait OffloadService: Send + Sync {
    /// Stores `data` under `id`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    fn write_data(&self, id: Uuid, data: &[u8]) -> Result<()>;

    /// Returns the blob stored under `id`, or `None` if it is missing or unreadable.
    fn read_data(&self, id: Uuid) -> Option<Vec<u8>>;

    /// Deletes the blob stored under `id`. Missing blobs are ignored.
    fn remove_data(&self, id: Uuid);

    /// On-disk location of the blob, for bulk export without reading it into memory.
    fn data_path(&self, id: Uuid) -> Option<PathBuf>;
}

/// `OffloadService` backed by a session-scoped temporary directory.
pub struct TempDirOffloadStore {
    dir: TempDir,
    index: DashMap<Uuid, PathBuf>,
}

impl std::fmt::Debug for TempDirOffloadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempDirOffloadStore")
            .field("root", &self.dir.path())
            .field("blobs", &self.index.len())
            .finish()
    }
}

impl TempDirOffloadStore {
    /// Creates a store in the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the session directory cannot be created.
    pub fn new() -> Result<Arc<Self>> {
        let dir = tempfile::Builder::new()
            .prefix("pixtile-offload-")
            .tempdir()
            .context("Failed to create offload session directory")?;
        Ok(Self::from_dir(dir))
    }

    /// Creates a store whose session directory lives under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` or the session directory cannot be created.
    pub fn new_in(parent: &Path) -> Result<Arc<Self>> {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create offload root: {}", parent.display()))?;
        let dir = tempfile::Builder::new()
            .prefix("pixtile-offload-")
            .tempdir_in(parent)
            .with_context(|| format!("Failed to create offload directory in {}", parent.display()))?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Arc<Self> {
        tracing::debug!("Offload store at {}", dir.path().display());
        Arc::new(Self {
            dir,
            index: DashMap::new(),
        })
    }

    /// The session directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn blob_path(&self, id: Uuid) -> PathBuf {
        self.dir.path().join(format!("{id}.bin"))
    }
}

impl OffloadService for TempDirOffloadStore {
    fn write_data(&self, id: Uuid, data: &[u8]) -> Result<()> {
        let path = self.blob_path(id);
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write offload blob {}", path.display()))?;
        self.index.insert(id, path);
        Ok(())
    }

    fn read_data(&self, id: Uuid) -> Option<Vec<u8>> {
        let path = self.index.get(&id)?.value().clone();
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Failed to read offload blob {}: {e}", path.display());
                None
            }
        }
    }

    fn remove_data(&self, id: Uuid) {
        if let Some((_, path)) = self.index.remove(&id) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove offload blob {}: {e}", path.display());
            }
        }
    }

    fn data_path(&self, id: Uuid) -> Option<PathBuf> {
        self.index.get(&id).map(|entry| entry.value().clone())
    }
}

/// Serializes `value` into a fresh blob. Returns the blob id, or `None`
/// (after logging) when serialization or the write fails.
pub fn offload_value<S: Serialize>(service: &dyn OffloadService, value: &S) -> Option<Uuid> {
    let bytes = match bincode::serialize(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to serialize history data for offload: {e}");
            return None;
        }
    };
    let id = Uuid::new_v4();
    match service.write_data(id, &bytes) {
        Ok(()) => Some(id),
        Err(e) => {
            tracing::warn!("Offload write failed, keeping entry resident: {e:#}");
            None
        }
    }
}

/// Reads and deserializes the blob `id`. The blob is left in place; callers
/// remove it once the value has been installed.
pub fn reload_value<D: DeserializeOwned>(service: &dyn OffloadService, id: Uuid) -> Option<D> {
    let Some(bytes) = service.read_data(id) else {
        tracing::warn!("Offload blob {id} is missing");
        return None;
    };
    match bincode::deserialize(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Failed to deserialize offload blob {id}: {e}");
            None
        }
    }
}

/// A payload that is either held in memory or parked in an offload blob.
///
/// Offloading serializes the payload, drops it, and keeps only the blob id.
/// A failed offload or reload leaves the value exactly as it was.
#[derive(Debug, Clone)]
pub enum Offloadable<T> {
    Resident(T),
    Offloaded(Uuid),
}

impl<T> Offloadable<T> {
    pub fn new(value: T) -> Self {
        Self::Resident(value)
    }

    pub fn is_offloaded(&self) -> bool {
        matches!(self, Self::Offloaded(_))
    }

    /// The payload, or `None` while offloaded.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Resident(value) => Some(value),
            Self::Offloaded(_) => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Resident(value) => Some(value),
            Self::Offloaded(_) => None,
        }
    }

    /// Removes the backing blob, if any. The payload is gone afterwards.
    pub fn discard(&mut self, service: &dyn OffloadService) {
        if let Self::Offloaded(id) = self {
            service.remove_data(*id);
        }
    }
}

impl<T: Serialize + DeserializeOwned> Offloadable<T> {
    /// Moves the payload into a blob. Returns false if it is already
    /// offloaded or the write failed.
    pub fn offload(&mut self, service: &dyn OffloadService) -> bool {
        let Self::Resident(value) = self else {
            return false;
        };
        match offload_value(service, &*value) {
            Some(id) => {
                *self = Self::Offloaded(id);
                true
            }
            None => false,
        }
    }

    /// Brings the payload back and removes its blob. Returns true when the
    /// payload is resident afterwards.
    pub fn reload(&mut self, service: &dyn OffloadService) -> bool {
        let Self::Offloaded(id) = *self else {
            return true;
        };
        let Some(value) = reload_value::<T>(service, id) else {
            return false;
        };
        service.remove_data(id);
        *self = Self::Resident(value);
        true
    }
}
