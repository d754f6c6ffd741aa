use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Separates an archive path from the entry inside it in a resource path,
/// e.g. `/lib/rt.jar|java/lang/Object.class`.
pub const ARCHIVE_SEPARATOR: char = '|';

/// On-disk identity of a resource.
///
/// Size and modification time are cheap to read; the content hash is only
/// consulted when they disagree, so touching a file without changing it does
/// not make its index entry stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub modified_nanos: u64,
    /// First eight bytes of the blake3 digest of the content.
    pub content_hash: u64,
}

/// How a file on disk relates to a stored fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Size and modification time match.
    Unchanged,
    /// Modification time moved but the content hash still matches.
    Touched,
    Changed,
    Missing,
}

impl Freshness {
    pub fn is_current(self) -> bool {
        matches!(self, Freshness::Unchanged | Freshness::Touched)
    }
}

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8], modified_nanos: u64) -> Self {
        Self {
            size: bytes.len() as u64,
            modified_nanos,
            content_hash: truncate(blake3::hash(bytes)),
        }
    }

    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            size: meta.len(),
            modified_nanos: modified_nanos(path, &meta),
            content_hash: hash_file(path)?,
        })
    }

    /// Compares this fingerprint against the file currently at `path`.
    pub fn compare(&self, path: &Path) -> std::io::Result<Freshness> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Freshness::Missing),
            Err(err) => return Err(err),
        };
        if meta.len() != self.size {
            return Ok(Freshness::Changed);
        }
        if modified_nanos(path, &meta) == self.modified_nanos {
            return Ok(Freshness::Unchanged);
        }
        if hash_file(path)? == self.content_hash {
            Ok(Freshness::Touched)
        } else {
            Ok(Freshness::Changed)
        }
    }
}

/// File on disk whose fingerprint stands for `resource_path`: the archive for
/// archive entries, the path itself otherwise.
pub fn backing_file(resource_path: &str) -> &Path {
    let file = resource_path
        .split_once(ARCHIVE_SEPARATOR)
        .map_or(resource_path, |(archive, _)| archive);
    Path::new(file)
}

fn truncate(hash: blake3::Hash) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

fn hash_file(path: &Path) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(truncate(hasher.finalize()))
}

fn modified_nanos(path: &Path, meta: &std::fs::Metadata) -> u64 {
    match meta.modified().map(|time| time.duration_since(UNIX_EPOCH)) {
        Ok(Ok(duration)) => u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
        Ok(Err(err)) => {
            tracing::debug!(
                target: "ndx.index",
                path = %path.display(),
                error = ?err,
                "file mtime is before UNIX_EPOCH; using 0 for fingerprint"
            );
            0
        }
        Err(err) => {
            tracing::debug!(
                target: "ndx.index",
                path = %path.display(),
                error = %err,
                "failed to read file mtime; using 0 for fingerprint"
            );
            0
        }
    }
}

/// In-memory answers to "is this resource up to date", keyed by path.
///
/// Each entry remembers the stored fingerprint it was computed for, so a
/// superseding resource with a new fingerprint misses the cache even without
/// an explicit [`dirty`](Self::dirty).
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: Mutex<HashMap<PathBuf, (Fingerprint, bool)>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path, stored: &Fingerprint) -> Option<bool> {
        match self.entries.lock().get(path) {
            Some((fingerprint, up_to_date)) if fingerprint == stored => Some(*up_to_date),
            _ => None,
        }
    }

    pub fn insert(&self, path: &Path, stored: Fingerprint, up_to_date: bool) {
        self.entries.lock().insert(path.to_path_buf(), (stored, up_to_date));
    }

    /// Forgets the cached answer for `path`.
    pub fn dirty(&self, path: &Path) {
        self.entries.lock().remove(path);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
