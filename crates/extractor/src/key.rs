//! Key derivation and key sourcing.
//!
//! Backups are protected with a 16 byte AES key derived from the user's
//! encryption key (`XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX`) by re-hashing it with
//! SHA-256 one hundred times. The same stretching turns `key ++ salt` into the
//! IV of every encrypted member.

use crate::error::ExtractError;
use parking_lot::Mutex;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Size of the derived AES-128 key and of the IV, in bytes.
pub const KEY_SIZE: usize = 16;

/// Fixed number of SHA-256 rounds used for key and IV stretching.
const STRETCH_ROUNDS: usize = 100;

const KEY_PATTERN: &str = "([A-Z0-9]{4}-){6}[A-Z0-9]{4}";

static KEY_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{KEY_PATTERN}$")).expect("key pattern is valid"));

static KEY_SEARCH: LazyLock<BytesRegex> =
    LazyLock::new(|| BytesRegex::new(KEY_PATTERN).expect("key pattern is valid"));

/// A derived AES-128 key.
pub type Key = [u8; KEY_SIZE];

/// Returns `true` if `candidate` is a well-formed encryption key.
///
/// # Examples
///
/// ```
/// use habackup::key::is_valid_key_format;
///
/// assert!(is_valid_key_format("AB12-CD34-EF56-GH78-IJ90-KL12-MN34"));
/// assert!(!is_valid_key_format("ab12-cd34-ef56-gh78-ij90-kl12-mn34"));
/// assert!(!is_valid_key_format("AB12-CD34"));
/// ```
pub fn is_valid_key_format(candidate: &str) -> bool {
    KEY_FORMAT.is_match(candidate)
}

/// Derives the AES key from an encryption key string.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidKeyFormat`] if `password` is not seven
/// hyphen separated groups of four uppercase letters or digits.
pub fn derive_key(password: &str) -> Result<Key, ExtractError> {
    if !is_valid_key_format(password) {
        return Err(ExtractError::InvalidKeyFormat);
    }

    Ok(stretch(password.as_bytes()))
}

/// Derives the CBC initialization vector of a member from its salt.
pub fn derive_iv(key: &Key, salt: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let mut seed = [0u8; 2 * KEY_SIZE];
    seed[..KEY_SIZE].copy_from_slice(key);
    seed[KEY_SIZE..].copy_from_slice(salt);
    stretch(&seed)
}

/// Hashes `seed`, re-hashes the full digest 99 more times and keeps the first
/// 16 bytes of the last digest.
fn stretch(seed: &[u8]) -> [u8; KEY_SIZE] {
    let mut digest = Sha256::digest(seed);
    for _ in 1..STRETCH_ROUNDS {
        digest = Sha256::digest(digest);
    }

    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&digest[..KEY_SIZE]);
    out
}

/// Scrapes the first encryption key out of an emergency kit text file.
///
/// # Errors
///
/// - [`ExtractError::Io`] if the file cannot be read or is a directory
/// - [`ExtractError::EmergencyKitMissingKey`] if no key-shaped text is found
pub fn extract_key_from_emergency_kit(path: &Path) -> Result<String, ExtractError> {
    let metadata = fs::metadata(path)?;
    if metadata.is_dir() {
        return Err(ExtractError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("emergency kit {} is a directory", path.display()),
        )));
    }

    let contents = fs::read(path)?;
    let found = KEY_SEARCH
        .find(&contents)
        .ok_or_else(|| ExtractError::EmergencyKitMissingKey(path.to_path_buf()))?;

    Ok(String::from_utf8_lossy(found.as_bytes()).into_owned())
}

/// Supplies the encryption key string on demand.
///
/// Implementations may read files or prompt the user; they are only invoked
/// when a protected backup actually needs a key.
pub trait KeyResolver: Send + Sync {
    /// Produce the encryption key string.
    fn resolve(&self) -> Result<String, ExtractError>;

    /// Whether a non-interactive key source was configured.
    fn has_source(&self) -> bool;
}

/// Key given on the command line or through an emergency kit file.
#[derive(Debug, Clone, Default)]
pub struct KeySource {
    /// Encryption key typed by the user
    pub password: Option<String>,

    /// Path to the emergency kit text file
    pub emergency_kit: Option<PathBuf>,
}

impl KeySource {
    pub fn new(password: Option<String>, emergency_kit: Option<PathBuf>) -> Self {
        Self {
            password: password.filter(|p| !p.trim().is_empty()),
            emergency_kit,
        }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self::new(Some(password.into()), None)
    }
}

impl KeyResolver for KeySource {
    fn resolve(&self) -> Result<String, ExtractError> {
        if let Some(password) = &self.password {
            let password = password.trim();
            if !is_valid_key_format(password) {
                return Err(ExtractError::InvalidKeyFormat);
            }
            tracing::debug!("key format verified");
            return Ok(password.to_string());
        }

        if let Some(kit) = &self.emergency_kit {
            let key = extract_key_from_emergency_kit(kit)?;
            tracing::info!("found encryption key in {}", kit.display());
            return Ok(key.trim().to_string());
        }

        Err(ExtractError::KeyUnavailable)
    }

    fn has_source(&self) -> bool {
        self.password.is_some() || self.emergency_kit.is_some()
    }
}

/// Lazily derived key shared by every extraction task of a run.
///
/// The first caller resolves and derives the key while holding the lock, so
/// concurrent callers wait for that single computation and then copy the
/// cached value. A failed resolution is not cached.
pub struct KeyStore {
    resolver: Box<dyn KeyResolver>,
    key: Mutex<Option<Key>>,
}

impl KeyStore {
    pub fn new(resolver: impl KeyResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            key: Mutex::new(None),
        }
    }

    /// Whether a password or emergency kit was supplied up front.
    pub fn has_source(&self) -> bool {
        self.resolver.has_source()
    }

    /// Returns the derived key, computing it on first use.
    pub fn key(&self) -> Result<Key, ExtractError> {
        let mut cached = self.key.lock();
        if let Some(key) = *cached {
            return Ok(key);
        }

        let password = self.resolver.resolve()?;
        let key = derive_key(&password)?;
        *cached = Some(key);
        Ok(key)
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("has_source", &self.has_source())
            .field("cached", &self.key.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const TEST_PASSWORD: &str = "XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX";
    const TEST_KEY: Key = [
        0xf1, 0x98, 0xef, 0xe5, 0x33, 0x48, 0x5b, 0x48, 0x1f, 0xad, 0x84, 0xe3, 0x08, 0xee, 0xb4,
        0x92,
    ];

    #[test]
    fn test_derive_key_vector() {
        assert_eq!(derive_key(TEST_PASSWORD).unwrap(), TEST_KEY);
    }

    #[test]
    fn test_derive_iv_vector() {
        let salt = [
            0xcb, 0x1e, 0xaf, 0x15, 0x02, 0xb0, 0xe2, 0x88, 0xa8, 0x3d, 0xb0, 0x10, 0xd5, 0x1c,
            0xbf, 0x07,
        ];
        let expected = [
            0x6d, 0x1c, 0xe4, 0xc4, 0x96, 0x7c, 0x6d, 0x0d, 0x21, 0x0a, 0x4d, 0x16, 0x02, 0xf9,
            0x8d, 0xbc,
        ];
        assert_eq!(derive_iv(&TEST_KEY, &salt), expected);
    }

    #[test]
    fn test_derive_key_rejects_bad_formats() {
        for bad in [
            "",
            "XXXX-XXXX-XXXX-XXXX-XXXX-XXXX",
            "XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX",
            "xxxx-xxxx-xxxx-xxxx-xxxx-xxxx-xxxx",
            "XXXX_XXXX_XXXX_XXXX_XXXX_XXXX_XXXX",
            "XXX-XXXXX-XXXX-XXXX-XXXX-XXXX-XXXX",
            " XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX",
            "XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXX!",
        ] {
            assert!(
                matches!(derive_key(bad), Err(ExtractError::InvalidKeyFormat)),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_extract_key_from_emergency_kit() {
        let temp_dir = TempDir::new().unwrap();
        let kit = temp_dir.path().join("kit.txt");
        fs::write(
            &kit,
            "Home Assistant emergency kit\n\nEncryption key:\nAB12-CD34-EF56-GH78-IJ90-KL12-MN34\nKEEP-THIS-SAFE\n",
        )
        .unwrap();

        let key = extract_key_from_emergency_kit(&kit).unwrap();
        assert_eq!(key, "AB12-CD34-EF56-GH78-IJ90-KL12-MN34");
    }

    #[test]
    fn test_extract_key_from_emergency_kit_without_key() {
        let temp_dir = TempDir::new().unwrap();
        let kit = temp_dir.path().join("kit.txt");
        fs::write(&kit, "nothing useful here").unwrap();

        let result = extract_key_from_emergency_kit(&kit);
        assert!(matches!(result, Err(ExtractError::EmergencyKitMissingKey(_))));
    }

    #[test]
    fn test_extract_key_from_emergency_kit_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = extract_key_from_emergency_kit(temp_dir.path());
        assert!(matches!(result, Err(ExtractError::Io(_))));

        let result = extract_key_from_emergency_kit(&temp_dir.path().join("missing.txt"));
        assert!(matches!(result, Err(ExtractError::Io(_))));
    }

    #[test]
    fn test_key_source_prefers_password() {
        let temp_dir = TempDir::new().unwrap();
        let kit = temp_dir.path().join("kit.txt");
        fs::write(&kit, "AAAA-AAAA-AAAA-AAAA-AAAA-AAAA-AAAA").unwrap();

        let source = KeySource::new(Some(format!(" {TEST_PASSWORD}\n")), Some(kit.clone()));
        assert_eq!(source.resolve().unwrap(), TEST_PASSWORD);

        let source = KeySource::new(None, Some(kit));
        assert_eq!(source.resolve().unwrap(), "AAAA-AAAA-AAAA-AAAA-AAAA-AAAA-AAAA");
    }

    #[test]
    fn test_key_source_without_source() {
        let source = KeySource::new(Some("   ".to_string()), None);
        assert!(!source.has_source());
        assert!(matches!(source.resolve(), Err(ExtractError::KeyUnavailable)));

        let source = KeySource::password("not-a-key");
        assert!(source.has_source());
        assert!(matches!(source.resolve(), Err(ExtractError::InvalidKeyFormat)));
    }

    struct CountingResolver(Arc<AtomicUsize>);

    impl KeyResolver for CountingResolver {
        fn resolve(&self) -> Result<String, ExtractError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(TEST_PASSWORD.to_string())
        }

        fn has_source(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_key_store_resolves_once_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = KeyStore::new(CountingResolver(calls.clone()));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| assert_eq!(store.key().unwrap(), TEST_KEY));
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_key_store_does_not_cache_failures() {
        let store = KeyStore::new(KeySource::default());
        assert!(store.key().is_err());
        assert!(store.key().is_err());
        assert!(!store.has_source());
    }
}
