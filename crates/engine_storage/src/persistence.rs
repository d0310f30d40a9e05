//! Snapshot files: the on-disk side of backup and restore.
//!
//! A snapshot is a single MessagePack file (`snapshot-<uuid>.msgpack`) holding
//! a [`SnapshotImage`]. The UUID is version 7, so file IDs order by capture
//! time. Files are written under a temporary name and renamed into place
//! once complete, so a listed snapshot is always a whole one.
//! Capturing and installing images is done by [`Storage`](crate::Storage);
//! this module only moves images to and from disk.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use engine_component::{ComponentRecord, Entity};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StorageError;

/// Version tag written into every image. Images with another version are
/// rejected as corrupt.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const FILE_PREFIX: &str = "snapshot-";
const FILE_EXTENSION: &str = "msgpack";
const WRITE_CHUNK: usize = 64 * 1024;

/// One live entity in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: Entity,
    pub archetype: Option<String>,
}

/// Full serialized storage state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotImage {
    pub format_version: u32,
    /// Milliseconds since the Unix epoch at capture time.
    pub created_at_ms: u64,
    /// The registry's next entity ID at capture time.
    pub next_entity_id: u64,
    pub entities: Vec<EntitySnapshot>,
    /// Records per component type name.
    pub tables: BTreeMap<String, Vec<ComponentRecord>>,
}

impl SnapshotImage {
    /// Create an image stamped with the current time.
    #[must_use]
    pub fn new(
        next_entity_id: u64,
        entities: Vec<EntitySnapshot>,
        tables: BTreeMap<String, Vec<ComponentRecord>>,
    ) -> Self {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_at_ms,
            next_entity_id,
            entities,
            tables,
        }
    }

    /// Structural checks that do not need component decoders: version, entity
    /// ID validity and uniqueness, an allocator position past every ID, and
    /// that every record belongs to an entity in the image.
    ///
    /// # Errors
    ///
    /// [`StorageError::CorruptSnapshot`] describing the first problem found.
    pub fn verify(&self) -> Result<(), StorageError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StorageError::CorruptSnapshot(format!(
                "unsupported format version {} (expected {SNAPSHOT_FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.next_entity_id == 0 || self.next_entity_id == u64::MAX {
            return Err(StorageError::CorruptSnapshot(format!(
                "next entity id {} is out of range",
                self.next_entity_id
            )));
        }
        let mut ids = HashSet::with_capacity(self.entities.len());
        for e in &self.entities {
            if !e.id.is_valid() {
                return Err(StorageError::CorruptSnapshot("entity id 0 is reserved".into()));
            }
            if e.id.id() >= self.next_entity_id {
                return Err(StorageError::CorruptSnapshot(format!(
                    "{} is not below next entity id {}",
                    e.id, self.next_entity_id
                )));
            }
            if !ids.insert(e.id) {
                return Err(StorageError::CorruptSnapshot(format!(
                    "{} listed more than once",
                    e.id
                )));
            }
        }
        for (type_name, records) in &self.tables {
            let mut seen = HashSet::with_capacity(records.len());
            for r in records {
                if !ids.contains(&r.entity) {
                    return Err(StorageError::CorruptSnapshot(format!(
                        "'{type_name}' record for unknown {}",
                        r.entity
                    )));
                }
                if !seen.insert(r.entity) {
                    return Err(StorageError::CorruptSnapshot(format!(
                        "{} has two '{type_name}' records",
                        r.entity
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Identifies a snapshot file. Handles order by capture time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotHandle {
    pub id: Uuid,
    pub path: PathBuf,
}

impl SnapshotHandle {
    fn new_in(dir: &Path) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            path: dir.join(format!("{FILE_PREFIX}{id}.{FILE_EXTENSION}")),
        }
    }

    /// Recognise a snapshot file by its name.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        if path.extension()? != FILE_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let id = Uuid::parse_str(stem.strip_prefix(FILE_PREFIX)?).ok()?;
        Some(Self { id, path })
    }
}

impl std::fmt::Display for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Cooperative cancellation flag for backups and restores.
///
/// Clones share the flag. Cancelling never corrupts the live store: a
/// cancelled backup removes its partial file and a cancelled restore stops
/// before anything is swapped in.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }
}

/// Encode `image` and write it into `dir` as a new snapshot file.
///
/// # Errors
///
/// [`StorageError::Io`] or [`StorageError::Encode`] on failure,
/// [`StorageError::Cancelled`] if `cancel` fires before the rename.
pub fn write_image(
    dir: &Path,
    image: &SnapshotImage,
    cancel: &CancelToken,
) -> Result<SnapshotHandle, StorageError> {
    fs::create_dir_all(dir)?;
    let bytes = rmp_serde::to_vec_named(image)?;
    let handle = SnapshotHandle::new_in(dir);
    let tmp = dir.join(format!(".{FILE_PREFIX}{}.tmp", handle.id));

    let result = write_chunks(&tmp, &bytes, cancel).and_then(|()| {
        cancel.check()?;
        fs::rename(&tmp, &handle.path)?;
        Ok(())
    });
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    info!(
        snapshot = %handle,
        bytes = bytes.len(),
        entities = image.entities.len(),
        tables = image.tables.len(),
        "snapshot written"
    );
    Ok(handle)
}

fn write_chunks(path: &Path, bytes: &[u8], cancel: &CancelToken) -> Result<(), StorageError> {
    let mut file = fs::File::create(path)?;
    for chunk in bytes.chunks(WRITE_CHUNK) {
        cancel.check()?;
        file.write_all(chunk)?;
    }
    file.sync_all()?;
    Ok(())
}

/// Read and decode the image behind `handle`, including its structural checks.
///
/// # Errors
///
/// [`StorageError::Io`] if the file cannot be read and
/// [`StorageError::CorruptSnapshot`] if it does not decode or verify.
pub fn read_image(handle: &SnapshotHandle) -> Result<SnapshotImage, StorageError> {
    let bytes = fs::read(&handle.path)?;
    let image: SnapshotImage = rmp_serde::from_slice(&bytes)
        .map_err(|e| StorageError::CorruptSnapshot(format!("{handle}: {e}")))?;
    image.verify()?;
    debug!(snapshot = %handle, entities = image.entities.len(), "snapshot read");
    Ok(image)
}

/// Snapshot files in `dir`, oldest first. A missing directory has none.
///
/// # Errors
///
/// [`StorageError::Io`] if the directory exists but cannot be read.
pub fn list(dir: &Path) -> Result<Vec<SnapshotHandle>, StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found = Vec::new();
    for entry in entries {
        if let Some(handle) = SnapshotHandle::from_path(entry?.path()) {
            found.push(handle);
        }
    }
    found.sort_unstable();
    Ok(found)
}

/// Delete a snapshot file.
///
/// # Errors
///
/// [`StorageError::Io`] if the file cannot be removed (including when it
/// does not exist).
pub fn delete(handle: &SnapshotHandle) -> Result<(), StorageError> {
    fs::remove_file(&handle.path)?;
    info!(snapshot = %handle, "snapshot deleted");
    Ok(())
}
