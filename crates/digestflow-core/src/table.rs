//! Per-file results and the aggregated digest table.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DigestError, FileFailure};
use crate::hash::ContentHash;

/// Outcome of digesting one regular file.
///
/// On a failed read `digest` is [`ContentHash::ZERO`] and `error` is set.
#[derive(Debug)]
pub struct FileResult {
    /// Path as discovered by the walk.
    pub path: PathBuf,
    /// Content hash, zero when the read failed.
    pub digest: ContentHash,
    /// Number of bytes hashed.
    pub bytes: u64,
    /// Read error, if any.
    pub error: Option<std::io::Error>,
}

impl FileResult {
    /// A successfully digested file.
    pub fn ok(path: PathBuf, digest: ContentHash, bytes: u64) -> Self {
        Self {
            path,
            digest,
            bytes,
            error: None,
        }
    }

    /// A file whose read failed.
    pub fn failed(path: PathBuf, error: std::io::Error) -> Self {
        Self {
            path,
            digest: ContentHash::ZERO,
            bytes: 0,
            error: Some(error),
        }
    }

    /// Whether the read failed.
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into a path/hash pair or a [`DigestError::FileRead`].
    pub fn into_result(self) -> Result<(PathBuf, ContentHash), DigestError> {
        match self.error {
            Some(source) => Err(DigestError::file_read(self.path, source)),
            None => Ok((self.path, self.digest)),
        }
    }
}

/// Mapping from file path to content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestTable {
    entries: BTreeMap<PathBuf, ContentHash>,
}

impl DigestTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a digest, returning the previous one for this path.
    pub fn insert(&mut self, path: PathBuf, digest: ContentHash) -> Option<ContentHash> {
        self.entries.insert(path, digest)
    }

    /// Look up the digest of a path.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&ContentHash> {
        self.entries.get(path.as_ref())
    }

    /// Number of files in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &ContentHash)> {
        self.entries.iter()
    }

    /// Group paths that share a digest.
    ///
    /// Only digests held by two or more paths are returned, largest groups
    /// first.
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        let mut by_hash: HashMap<ContentHash, Vec<PathBuf>> = HashMap::new();
        for (path, hash) in &self.entries {
            by_hash.entry(*hash).or_default().push(path.clone());
        }

        let mut groups: Vec<DuplicateGroup> = by_hash
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(hash, paths)| DuplicateGroup { hash, paths })
            .collect();

        groups.sort_by(|a, b| {
            b.paths
                .len()
                .cmp(&a.paths.len())
                .then_with(|| a.paths.cmp(&b.paths))
        });
        groups
    }
}

impl FromIterator<(PathBuf, ContentHash)> for DigestTable {
    fn from_iter<I: IntoIterator<Item = (PathBuf, ContentHash)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DigestTable {
    type Item = (PathBuf, ContentHash);
    type IntoIter = std::collections::btree_map::IntoIter<PathBuf, ContentHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Files sharing identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Content hash shared by all files in this group.
    pub hash: ContentHash,
    /// Paths to all files with this content, in path order.
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Number of files in the group.
    pub fn count(&self) -> usize {
        self.paths.len()
    }
}

/// Table plus every per-file failure, produced by the collect-all policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestReport {
    /// Digests of every file read successfully.
    pub table: DigestTable,
    /// Files that could not be read.
    pub failures: Vec<FileFailure>,
    /// Total bytes hashed.
    pub bytes_hashed: u64,
}

impl DigestReport {
    /// Whether every discovered file was digested.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
