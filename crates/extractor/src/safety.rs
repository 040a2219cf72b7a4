//! Security and safety checks for archive extraction.
//!
//! This module provides the path sanitization that keeps archive entries
//! inside their destination directory (zip-slip protection), the per-entry
//! size cap, and the closed set of entry kinds the walker dispatches on.

use crate::error::{ExtractError, SecurityError};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Kind of a tar entry, with the link target where one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory
    Directory,
    /// Regular file
    File,
    /// Symbolic link, target stored verbatim
    Symlink { target: PathBuf },
    /// Hard link to another entry of the same archive
    Hardlink { target: PathBuf },
    /// Other special file types (device, fifo, ...), identified by the type flag
    Other(u8),
}

impl EntryKind {
    /// Classifies a tar header type flag.
    ///
    /// A link entry without a link name is reported as [`EntryKind::Other`].
    pub fn from_tar(entry_type: tar::EntryType, link_name: Option<PathBuf>) -> Self {
        if entry_type.is_dir() {
            EntryKind::Directory
        } else if entry_type.is_file() {
            EntryKind::File
        } else if entry_type.is_symlink() {
            match link_name {
                Some(target) => EntryKind::Symlink { target },
                None => EntryKind::Other(entry_type.as_byte()),
            }
        } else if entry_type.is_hard_link() {
            match link_name {
                Some(target) => EntryKind::Hardlink { target },
                None => EntryKind::Other(entry_type.as_byte()),
            }
        } else {
            EntryKind::Other(entry_type.as_byte())
        }
    }
}

/// Lexically normalizes a path: drops `.`, folds `name/..` pairs and keeps
/// leading `..` of relative paths.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    out
}

/// Joins an archive entry name onto `dest` and rejects the result if it
/// escapes `dest` after normalization.
///
/// Leading `/` in entry names is ignored, so absolute names land inside
/// `dest` as well.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use habackup::safety::sanitize_entry_path;
///
/// let path = sanitize_entry_path(Path::new("/out"), Path::new("sub/file.txt")).unwrap();
/// assert_eq!(path, Path::new("/out/sub/file.txt"));
///
/// // Path traversal attempt - rejected
/// assert!(sanitize_entry_path(Path::new("/out"), Path::new("../../etc/passwd")).is_err());
/// ```
pub fn sanitize_entry_path(dest: &Path, name: &Path) -> Result<PathBuf, SecurityError> {
    let base = clean_path(dest);

    let relative: PathBuf = name
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    let joined = clean_path(&base.join(relative));

    let escaped = if base.as_os_str().is_empty() {
        matches!(joined.components().next(), Some(Component::ParentDir))
    } else {
        !joined.starts_with(&base)
    };

    if escaped {
        return Err(SecurityError::PathTraversal(name.display().to_string()));
    }

    Ok(joined)
}

/// Copies at most `limit` bytes of `reader` into a new file at `path`.
///
/// Hitting the cap without reaching the end of the entry fails with
/// [`ExtractError::SizeLimitExceeded`]; the truncated file is left in place.
pub fn copy_capped<R: Read>(reader: &mut R, path: &Path, limit: u64) -> Result<u64, ExtractError> {
    let mut file = File::create(path)?;
    let written = io::copy(&mut reader.by_ref().take(limit), &mut file)?;

    if written == limit {
        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? > 0 {
            return Err(ExtractError::SizeLimitExceeded {
                path: path.to_path_buf(),
                limit,
            });
        }
    }

    Ok(written)
}
