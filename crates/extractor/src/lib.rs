//! # habackup
//!
//! Decryption and safe extraction of Home Assistant backups.
//!
//! A backup is a plain tar file holding a `backup.json` manifest and one
//! `.tar.gz` archive per backed up component. In protected backups those inner
//! archives are AES-128-CBC encrypted with a key derived from the user's
//! encryption key (`XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX`).
//!
//! Extraction guards against path traversal, caps the size of every extracted
//! file, defers hard links until their targets exist, and unpacks the inner
//! archives concurrently.
//!
//! ## Example
//!
//! ```rust,no_run
//! use habackup::{extract, ExtractOptions, KeySource, KeyStore};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keys = KeyStore::new(KeySource::password("AB12-CD34-EF56-GH78-IJ90-KL12-MN34"));
//! let options = ExtractOptions::default();
//!
//! let report = extract(Path::new("a1b2c3d4.tar"), &options, &keys)?;
//! println!(
//!     "Extracted {} into {} ({} of {} inner archives)",
//!     report.backup.display(),
//!     report.destination.display(),
//!     report.members_extracted,
//!     report.members_total,
//! );
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod decrypt;
pub mod error;
pub mod extract;
pub mod filter;
pub mod key;
pub mod manifest;
pub mod safety;
pub mod types;
pub mod walker;

// Re-export main types
pub use batch::{extract_backups, BackupFailure, BatchSummary};
pub use decrypt::SecureTarReader;
pub use error::{DecryptError, ExtractError, ManifestError, SecurityError};
pub use filter::EntryFilter;
pub use key::{derive_key, KeyResolver, KeySource, KeyStore};
pub use manifest::BackupManifest;
pub use safety::EntryKind;
pub use types::{BackupReport, ExtractOptions, ExtractionResult};
pub use walker::ArchiveWalker;

use std::path::Path;

/// Extract one backup file.
///
/// # Arguments
///
/// * `backup` - Path to the backup `.tar` file
/// * `options` - Extraction options (filters, output directory, size cap, ...)
/// * `keys` - Key cache shared by every extraction of the run
///
/// # Returns
///
/// Returns a `BackupReport` describing the destination and the manifest.
///
/// # Errors
///
/// Returns an error if:
/// - The file is not a `.tar` file or cannot be read
/// - The destination directory already exists
/// - Security violations are detected (path traversal, size limits)
/// - `backup.json` is malformed or describes an unsupported backup
/// - Any inner archive fails to decrypt or unpack
pub fn extract(
    backup: &Path,
    options: &ExtractOptions,
    keys: &KeyStore,
) -> Result<BackupReport, ExtractError> {
    extract::extract_backup(backup, options, keys)
}
