//! Content identity for files and directory trees.
//!
//! Digests are SHA-256. A directory digest is the hash of its member file
//! digests fed in file-name order, so it depends only on content and layout
//! order, never on timestamps. Control directories (VCS metadata) are never
//! part of a directory's identity. A dangling symlink makes the subject
//! holding it unhashable.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directories skipped when hashing or scanning for duplicates.
pub const DEFAULT_CONTROL_DIRS: &[&str] = &[".git", ".github"];

const READ_BLOCK_BYTES: usize = 8 * 1024;

pub fn default_control_dirs() -> Vec<String> {
    DEFAULT_CONTROL_DIRS.iter().map(|d| d.to_string()).collect()
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", &self.to_hex()[..12])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk {}: {message}", .path.display())]
    Walk { path: PathBuf, message: String },
    #[error("{} contains no files", .0.display())]
    Empty(PathBuf),
}

/// A subject path paired with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    pub subject_path: PathBuf,
    pub digest: ContentDigest,
}

/// Hash a file's bytes, streaming in fixed-size blocks.
pub fn hash_file(path: &Path) -> Result<ContentDigest, HashError> {
    let read_err = |source| HashError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut block = [0u8; READ_BLOCK_BYTES];
    loop {
        match file.read(&mut block) {
            Ok(0) => break,
            Ok(n) => hasher.update(&block[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(read_err(err)),
        }
    }
    Ok(ContentDigest(hasher.finalize().into()))
}

/// Hash every file below `path` (control directories excluded) into one digest.
/// Fails if any member fails to hash, or if there are no members.
pub fn hash_directory(path: &Path, control_dirs: &[String]) -> Result<ContentDigest, HashError> {
    hash_directory_cached(path, control_dirs, &mut HashMap::new())
}

fn hash_directory_cached(
    path: &Path,
    control_dirs: &[String],
    file_digests: &mut HashMap<PathBuf, ContentDigest>,
) -> Result<ContentDigest, HashError> {
    let mut hasher = Sha256::new();
    let mut members = 0usize;
    for entry in walk(path, control_dirs) {
        let entry = entry.map_err(|err| walk_error(path, err))?;
        check_link(&entry)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let digest = match file_digests.get(entry.path()) {
            Some(digest) => *digest,
            None => {
                let digest = hash_file(entry.path())?;
                file_digests.insert(entry.path().to_path_buf(), digest);
                digest
            }
        };
        hasher.update(digest.as_bytes());
        members += 1;
    }
    if members == 0 {
        return Err(HashError::Empty(path.to_path_buf()));
    }
    Ok(ContentDigest(hasher.finalize().into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Directory,
    File,
}

impl SubjectKind {
    pub fn noun(&self) -> &'static str {
        match self {
            SubjectKind::Directory => "directory",
            SubjectKind::File => "file",
        }
    }
}

/// A later subject whose content matches an earlier (canonical) one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePair {
    pub kind: SubjectKind,
    pub canonical: PathBuf,
    pub duplicate: PathBuf,
    pub digest: ContentDigest,
}

#[derive(Debug, Default)]
pub struct DuplicateScan {
    /// In discovery order.
    pub pairs: Vec<DuplicatePair>,
    /// Subjects that could not be hashed and so took no part in the scan.
    pub skipped: Vec<(PathBuf, HashError)>,
}

/// Report directories below `root` whose content matches an earlier directory.
pub fn find_duplicate_dirs(root: &Path, control_dirs: &[String]) -> Result<DuplicateScan, HashError> {
    ensure_dir(root)?;
    let mut file_digests = HashMap::new();
    let mut subjects = Vec::new();
    let mut scan = DuplicateScan::default();

    for entry in walk(root, control_dirs) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                scan.skipped.push((path, walk_error(root, err)));
                continue;
            }
        };
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            continue;
        }
        match hash_directory_cached(entry.path(), control_dirs, &mut file_digests) {
            Ok(digest) => subjects.push(ContentHash {
                subject_path: entry.into_path(),
                digest,
            }),
            Err(HashError::Empty(_)) => {}
            Err(err) => scan.skipped.push((entry.into_path(), err)),
        }
    }

    scan.pairs = pair_duplicates(SubjectKind::Directory, subjects);
    Ok(scan)
}

/// Report files below `root` whose bytes match an earlier file.
pub fn find_duplicate_files(root: &Path, control_dirs: &[String]) -> Result<DuplicateScan, HashError> {
    ensure_dir(root)?;
    let mut subjects = Vec::new();
    let mut scan = DuplicateScan::default();

    for entry in walk(root, control_dirs) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                scan.skipped.push((path, walk_error(root, err)));
                continue;
            }
        };
        if let Err(err) = check_link(&entry) {
            scan.skipped.push((entry.into_path(), err));
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        match hash_file(entry.path()) {
            Ok(digest) => subjects.push(ContentHash {
                subject_path: entry.into_path(),
                digest,
            }),
            Err(err) => scan.skipped.push((entry.into_path(), err)),
        }
    }

    scan.pairs = pair_duplicates(SubjectKind::File, subjects);
    Ok(scan)
}

fn pair_duplicates(kind: SubjectKind, subjects: Vec<ContentHash>) -> Vec<DuplicatePair> {
    let mut first_seen: HashMap<ContentDigest, PathBuf> = HashMap::new();
    let mut pairs = Vec::new();
    for ContentHash {
        subject_path: path,
        digest,
    } in subjects
    {
        match first_seen.get(&digest) {
            // A directory whose only content is one subdirectory hashes the
            // same as that subdirectory; nesting is not duplication.
            Some(canonical) if path.starts_with(canonical) => {}
            Some(canonical) => pairs.push(DuplicatePair {
                kind,
                canonical: canonical.clone(),
                duplicate: path,
                digest,
            }),
            None => {
                first_seen.insert(digest, path);
            }
        }
    }
    pairs
}

/// Stable, depth-first traversal that never descends into control directories.
pub fn walk<'a>(
    root: &Path,
    control_dirs: &'a [String],
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !is_control_dir(entry, control_dirs))
}

fn is_control_dir(entry: &DirEntry, control_dirs: &[String]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    control_dirs.iter().any(|dir| dir.as_str() == name.as_ref())
}

/// Links are not followed and take no part in a digest, but a link whose
/// target is gone means the checkout is incomplete.
fn check_link(entry: &DirEntry) -> Result<(), HashError> {
    if !entry.path_is_symlink() {
        return Ok(());
    }
    std::fs::metadata(entry.path())
        .map(|_| ())
        .map_err(|source| HashError::Read {
            path: entry.path().to_path_buf(),
            source,
        })
}

fn ensure_dir(root: &Path) -> Result<(), HashError> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(HashError::Walk {
            path: root.to_path_buf(),
            message: "not a directory".to_string(),
        })
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> HashError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(source) => HashError::Read { path, source },
        None => HashError::Walk {
            path,
            message: "filesystem loop detected".to_string(),
        },
    }
}
