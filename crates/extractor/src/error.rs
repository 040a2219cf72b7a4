//! Error types for backup decryption and extraction.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extraction operations.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The key does not match `XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX`.
    #[error("Invalid key format, expected XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX")]
    InvalidKeyFormat,

    /// The emergency kit was readable but contained no key.
    #[error("Emergency kit {0} does not contain an encryption key")]
    EmergencyKitMissingKey(PathBuf),

    /// No password, emergency kit or prompt could provide a key.
    #[error("No encryption key available")]
    KeyUnavailable,

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// The encrypted member framing is broken.
    #[error("Decryption failed: {0}")]
    Decrypt(#[from] DecryptError),

    /// The destination directory of a walk is already present.
    #[error("Destination {0} already exists")]
    DestinationExists(PathBuf),

    /// A single entry grew past the configured maximum size.
    #[error("Size of {path} exceeds allowed size {limit} bytes")]
    SizeLimitExceeded {
        /// Destination path of the offending entry
        path: PathBuf,
        /// Configured size limit in bytes
        limit: u64,
    },

    /// The input is not a regular `.tar` file.
    #[error("Not a tar file: {0}")]
    NotATarFile(PathBuf),

    /// `backup.json` is not valid JSON for a backup manifest.
    #[error("Failed to parse manifest {path}: {source}")]
    ManifestUnmarshal {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `backup.json` describes a backup this tool cannot read.
    #[error("Failed to validate manifest {path}: {source}")]
    ManifestValidation {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    /// One or more inner archives failed; `last` is the most recent failure.
    #[error("{failed} of {total} inner archive(s) failed, last error: {last}")]
    MembersFailed {
        failed: usize,
        total: usize,
        last: Box<ExtractError>,
    },

    /// A worker task panicked or was aborted.
    #[error("Extraction task failed: {0}")]
    TaskFailed(String),

    /// An I/O error occurred during extraction.
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for ExtractError {
    // Decryption errors cross the `Read` boundary as io::Error.
    fn from(err: io::Error) -> Self {
        match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<DecryptError>())
        {
            Some(decrypt) => ExtractError::Decrypt(*decrypt),
            None => ExtractError::Io(err),
        }
    }
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),
}

/// Framing errors raised by the decrypting reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecryptError {
    /// The source ended before the 16 byte salt (or extended header) was read.
    #[error("not enough bytes for the container header")]
    TruncatedHeader,

    /// A read returned fewer bytes than one cipher block.
    #[error("ciphertext too short: {0} bytes")]
    CiphertextTooShort(usize),

    /// A read returned a byte count that is not a multiple of the block size.
    #[error("ciphertext is not a multiple of the block size: {0} bytes")]
    CiphertextNotBlockAligned(usize),
}

impl From<DecryptError> for io::Error {
    fn from(err: DecryptError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Manifest validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("crypto type {0:?} not supported")]
    UnsupportedCrypto(String),

    #[error("backup version {0} not supported")]
    UnsupportedVersion(i64),
}

impl ExtractError {
    /// Whether the failure is consistent with a wrong key.
    ///
    /// CBC decryption with the wrong key succeeds and yields garbage, so a
    /// wrong password only shows up as a framing, gzip or tar error further
    /// down the pipeline.
    pub fn may_be_wrong_key(&self) -> bool {
        match self {
            ExtractError::Decrypt(_) => true,
            ExtractError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::InvalidData
                    | io::ErrorKind::InvalidInput
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::Other
            ),
            ExtractError::MembersFailed { last, .. } => last.may_be_wrong_key(),
            _ => false,
        }
    }
}
