//! Streaming tar walker with path sanitization and deferred hard links.

use crate::error::ExtractError;
use crate::safety::{clean_path, copy_capped, sanitize_entry_path, EntryKind};
use crate::types::{ExtractOptions, ExtractionResult};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Unpacks one tar stream into a fresh directory.
///
/// Entries are processed in stream order. Hard links are collected during the
/// pass and created once the whole stream has been written, since a link may
/// precede its target and the stream cannot be rewound.
#[derive(Debug)]
pub struct ArchiveWalker<'a> {
    root: PathBuf,
    options: &'a ExtractOptions,
    apply_filter: bool,
    // Outer archives must not overwrite an earlier extraction.
    require_fresh: bool,
}

impl<'a> ArchiveWalker<'a> {
    /// Walker for an outer archive: applies the include/exclude filter of
    /// `options` and refuses a destination that already exists.
    pub fn new(dest: &Path, options: &'a ExtractOptions) -> Self {
        Self {
            root: clean_path(dest),
            options,
            apply_filter: true,
            require_fresh: true,
        }
    }

    /// Walker for an inner archive: extracts every entry regardless of the
    /// filter, into a destination that may already exist.
    pub fn unfiltered(dest: &Path, options: &'a ExtractOptions) -> Self {
        Self {
            apply_filter: false,
            require_fresh: false,
            ..Self::new(dest, options)
        }
    }

    /// Extracts `reader` into the destination directory.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::DestinationExists`] if an outer archive's destination
    ///   is already there
    /// - [`ExtractError::Security`] for entries escaping the destination
    /// - [`ExtractError::SizeLimitExceeded`] for entries above the size cap
    /// - I/O and tar format errors
    ///
    /// Files written before a failure are left on disk.
    ///
    /// Containment is checked lexically; symlinks created earlier in the same
    /// stream are not resolved, so an entry below a symlink can land outside
    /// the destination.
    pub fn walk<R: Read>(self, reader: R) -> Result<ExtractionResult, ExtractError> {
        if self.require_fresh && self.root.exists() {
            return Err(ExtractError::DestinationExists(self.root));
        }
        fs::create_dir_all(&self.root)?;

        let mut archive = tar::Archive::new(reader);
        let mut result = ExtractionResult::default();
        let mut deferred: Vec<(PathBuf, PathBuf)> = Vec::new();
        let filtered = self.apply_filter && !self.options.filter.is_empty();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let path = sanitize_entry_path(&self.root, &entry.path()?)?;

            if path == self.root {
                continue;
            }

            if filtered && !self.options.filter.allows(&raw_name) {
                tracing::debug!("filtered out {raw_name}");
                continue;
            }

            let link_name = entry.link_name()?.map(|name| name.into_owned());
            let kind = EntryKind::from_tar(entry.header().entry_type(), link_name);
            tracing::debug!(?kind, "extracting {}", path.display());

            match kind {
                EntryKind::Directory => {
                    fs::create_dir_all(&path)?;
                    result.extracted.push(path);
                }
                EntryKind::File => {
                    create_parent(&path)?;
                    copy_capped(&mut entry, &path, self.options.max_archive_size)?;
                    result.extracted.push(path);
                }
                EntryKind::Symlink { target } => {
                    if !self.options.skip_create_links {
                        create_parent(&path)?;
                        create_symlink(&target, &path)?;
                        result.extracted.push(path);
                    }
                }
                EntryKind::Hardlink { target } => {
                    if !self.options.skip_create_links {
                        deferred.push((path, target));
                    }
                }
                EntryKind::Other(flag) => {
                    tracing::warn!(
                        "skipping {raw_name}: unsupported entry type '{}'",
                        char::from(flag)
                    );
                    result.skipped.push(path);
                }
            }
        }

        self.resolve_hard_links(deferred, &mut result)?;

        Ok(result)
    }

    /// Second pass: link against the finished tree, skipping missing targets.
    fn resolve_hard_links(
        &self,
        deferred: Vec<(PathBuf, PathBuf)>,
        result: &mut ExtractionResult,
    ) -> Result<(), ExtractError> {
        for (link, target) in deferred {
            let original = sanitize_entry_path(&self.root, &target)?;

            if fs::symlink_metadata(&original).is_err() {
                tracing::warn!(
                    "skipping hard link {}: target {} was not extracted",
                    link.display(),
                    target.display()
                );
                result.skipped.push(link);
                continue;
            }

            create_parent(&link)?;
            fs::hard_link(&original, &link)?;
            result.extracted.push(link.clone());
            result.hard_links.insert(link, original);
        }

        Ok(())
    }
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link)
    }
}
