//! Backup extraction: outer archive, manifest, then the inner archives.

use crate::decrypt::SecureTarReader;
use crate::error::ExtractError;
use crate::key::KeyStore;
use crate::manifest::{BackupManifest, MANIFEST_FILE};
use crate::types::{BackupReport, ExtractOptions, ExtractionResult};
use crate::walker::ArchiveWalker;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;

/// Extension of a backup file.
pub const TAR_EXTENSION: &str = "tar";

/// Suffix of the compressed (and possibly encrypted) inner archives.
pub const NESTED_ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Extracts one backup file.
///
/// This function performs the following steps:
/// - Checks that `backup` is a regular `.tar` file
/// - Unpacks the outer archive into the destination directory
/// - Reads and validates `backup.json`, or synthesizes a manifest without one
/// - Decrypts (when protected) and unpacks every inner `.tar.gz` concurrently,
///   removing each inner archive once it was unpacked
///
/// # Arguments
///
/// * `backup` - Path to the backup `.tar` file
/// * `options` - Extraction options
/// * `keys` - Shared key cache, only consulted for protected backups
///
/// # Errors
///
/// Returns the first error of the outer walk or manifest handling. Inner
/// archive failures do not stop their siblings; they are reported together as
/// [`ExtractError::MembersFailed`] carrying the last failure.
pub fn extract_backup(
    backup: &Path,
    options: &ExtractOptions,
    keys: &KeyStore,
) -> Result<BackupReport, ExtractError> {
    validate_tar_file(backup)?;

    let destination = destination_dir(backup, options);
    tracing::info!(
        "extracting {} into {}",
        backup.display(),
        destination.display()
    );

    let outer = {
        let reader = BufReader::new(File::open(backup)?);
        ArchiveWalker::new(&destination, options).walk(reader)?
    };

    let manifest = load_manifest(backup, &outer, keys)?;

    let mut report = BackupReport {
        backup: backup.to_path_buf(),
        destination,
        manifest,
        extracted: outer.extracted.len(),
        skipped: outer.skipped.len(),
        members_total: 0,
        members_extracted: 0,
    };

    if !report.manifest.compressed {
        return Ok(report);
    }

    let members = nested_archives(&outer.extracted);
    report.members_total = members.len();
    if members.is_empty() {
        return Ok(report);
    }

    report.members_extracted =
        extract_members(backup, &members, report.manifest.protected, options, keys)?;

    Ok(report)
}

/// Checks that `path` is a regular file with a `.tar` extension.
pub fn validate_tar_file(path: &Path) -> Result<(), ExtractError> {
    let metadata = fs::metadata(path)?;

    let is_tar = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TAR_EXTENSION));

    if !metadata.is_file() || !is_tar {
        return Err(ExtractError::NotATarFile(path.to_path_buf()));
    }

    Ok(())
}

/// Directory the outer archive of `backup` is unpacked into.
pub fn destination_dir(backup: &Path, options: &ExtractOptions) -> PathBuf {
    let base = archive_base_name(backup);

    match &options.output_dir {
        Some(out) if options.extract_to_subdir => out.join(base),
        Some(out) => out.clone(),
        None => backup.parent().unwrap_or(Path::new("")).join(base),
    }
}

/// File name without directory and without a `.tar.gz` / `.tar` suffix.
pub fn archive_base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = strip_suffix_ignore_case(&name, NESTED_ARCHIVE_SUFFIX).unwrap_or(&name);
    let name = strip_suffix_ignore_case(name, ".tar").unwrap_or(name);
    name.to_string()
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    let tail = name.get(split..)?;
    tail.eq_ignore_ascii_case(suffix)
        .then(|| name.get(..split))
        .flatten()
}

fn has_nested_suffix(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .is_some_and(|name| name.ends_with(NESTED_ARCHIVE_SUFFIX))
}

/// Extracted paths that look like inner archives.
pub fn nested_archives(extracted: &[PathBuf]) -> Vec<PathBuf> {
    extracted
        .iter()
        .filter(|path| has_nested_suffix(path))
        .cloned()
        .collect()
}

/// Finds and validates `backup.json` among the outer archive's files.
fn load_manifest(
    backup: &Path,
    outer: &ExtractionResult,
    keys: &KeyStore,
) -> Result<BackupManifest, ExtractError> {
    let manifest_path = outer.extracted.iter().find(|path| {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case(MANIFEST_FILE))
    });

    let Some(path) = manifest_path else {
        tracing::warn!("backup {} has no {MANIFEST_FILE}", backup.display());
        let compressed = outer.extracted.iter().any(|path| has_nested_suffix(path));
        return Ok(BackupManifest::synthetic(compressed, keys.has_source()));
    };

    let manifest = BackupManifest::from_file(path)?;
    manifest
        .validate()
        .map_err(|source| ExtractError::ManifestValidation {
            path: path.clone(),
            source,
        })?;

    tracing::debug!(
        slug = %manifest.slug,
        protected = manifest.protected,
        compressed = manifest.compressed,
        "manifest validated"
    );

    Ok(manifest)
}

/// Unpacks every inner archive on its own thread and joins the outcomes.
fn extract_members(
    backup: &Path,
    members: &[PathBuf],
    protected: bool,
    options: &ExtractOptions,
    keys: &KeyStore,
) -> Result<usize, ExtractError> {
    let outcomes: Vec<Result<(), ExtractError>> = thread::scope(|scope| {
        let handles: Vec<_> = members
            .iter()
            .map(|member| {
                scope.spawn(move || extract_member(backup, member, protected, options, keys))
            })
            .collect();

        handles
            .into_iter()
            .zip(members)
            .map(|(handle, member)| {
                handle.join().unwrap_or_else(|_| {
                    Err(ExtractError::TaskFailed(format!(
                        "worker for {} panicked",
                        member.display()
                    )))
                })
            })
            .collect()
    });

    let total = outcomes.len();
    let mut succeeded = 0;
    let mut last_error = None;

    for outcome in outcomes {
        match outcome {
            Ok(()) => succeeded += 1,
            Err(err) => last_error = Some(err),
        }
    }

    match last_error {
        None => Ok(succeeded),
        Some(last) => Err(ExtractError::MembersFailed {
            failed: total - succeeded,
            total,
            last: Box::new(last),
        }),
    }
}

/// Unpacks one inner archive and removes it on success.
fn extract_member(
    backup: &Path,
    member: &Path,
    protected: bool,
    options: &ExtractOptions,
    keys: &KeyStore,
) -> Result<(), ExtractError> {
    let label = format!(
        "{}/{}",
        archive_base_name(backup),
        member
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default()
    );

    match unpack_member(member, protected, options, keys) {
        Ok(result) => {
            fs::remove_file(member)?;
            tracing::info!(
                "extracted {label} ({} entries, {} skipped)",
                result.extracted.len(),
                result.skipped.len()
            );
            Ok(())
        }
        Err(err) => {
            let hint = if err.may_be_wrong_key() {
                " - possible wrong password or broken file"
            } else {
                ""
            };
            if options.verbose {
                tracing::error!("unable to extract {label}{hint}: {err:?}");
            } else {
                tracing::error!("unable to extract {label}{hint}: {err}");
            }
            Err(err)
        }
    }
}

fn unpack_member(
    member: &Path,
    protected: bool,
    options: &ExtractOptions,
    keys: &KeyStore,
) -> Result<ExtractionResult, ExtractError> {
    let key = if protected { Some(keys.key()?) } else { None };

    let file = File::open(member)?;
    let dest = member
        .parent()
        .unwrap_or(Path::new(""))
        .join(archive_base_name(member));
    let walker = ArchiveWalker::unfiltered(&dest, options);

    match key {
        Some(key) => walker.walk(GzDecoder::new(SecureTarReader::new(file, key))),
        None => walker.walk(GzDecoder::new(file)),
    }
}
