//! Interactive fallback for the encryption key.

use habackup::key::is_valid_key_format;
use habackup::{ExtractError, KeyResolver, KeySource};
use indicatif::ProgressBar;
use std::io;

/// Resolves the key from the command line or emergency kit, asking on the
/// terminal when neither was given.
pub struct PromptingResolver {
    source: KeySource,
    progress: ProgressBar,
}

impl PromptingResolver {
    /// `progress` is hidden while the prompt is shown.
    pub fn new(source: KeySource, progress: ProgressBar) -> Self {
        Self { source, progress }
    }

    fn prompt(&self) -> Result<String, ExtractError> {
        loop {
            let key = self.progress.suspend(|| {
                dialoguer::Password::new()
                    .with_prompt("Backup encryption key")
                    .interact()
                    .map_err(|e| io::Error::other(format!("key prompt: {e}")))
            })?;

            let key = key.trim();
            if is_valid_key_format(key) {
                return Ok(key.to_string());
            }

            self.progress.suspend(|| {
                eprintln!("{}", ExtractError::InvalidKeyFormat);
            });
        }
    }
}

impl KeyResolver for PromptingResolver {
    fn resolve(&self) -> Result<String, ExtractError> {
        if self.source.has_source() {
            return self.source.resolve();
        }
        self.prompt()
    }

    fn has_source(&self) -> bool {
        self.source.has_source()
    }
}
