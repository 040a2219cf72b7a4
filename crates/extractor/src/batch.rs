//! Concurrent extraction of several backup files.

use crate::error::ExtractError;
use crate::extract::extract_backup;
use crate::key::KeyStore;
use crate::types::{BackupReport, ExtractOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

/// A backup that could not be extracted completely.
#[derive(Debug)]
pub struct BackupFailure {
    /// The backup file, unknown if its task died before reporting
    pub backup: Option<PathBuf>,
    pub error: ExtractError,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: Vec<BackupReport>,
    pub failed: Vec<BackupFailure>,
}

impl BatchSummary {
    /// Every backup was extracted fully.
    pub fn is_success(&self) -> bool {
        self.total > 0 && self.succeeded.len() == self.total
    }

    /// Error of the most recently finished failing backup.
    pub fn last_error(&self) -> Option<&ExtractError> {
        self.failed.last().map(|failure| &failure.error)
    }
}

/// Extracts every backup in its own blocking task.
///
/// With more than one backup each one gets its own subdirectory of the output
/// root, which is created up front. Results are drained by this coordinator,
/// so no counter is shared between tasks. `on_done` is invoked once per
/// finished backup, in completion order.
pub async fn extract_backups<F>(
    backups: Vec<PathBuf>,
    mut options: ExtractOptions,
    keys: Arc<KeyStore>,
    mut on_done: F,
) -> Result<BatchSummary, ExtractError>
where
    F: FnMut(&PathBuf, &Result<BackupReport, ExtractError>),
{
    let mut summary = BatchSummary {
        total: backups.len(),
        ..BatchSummary::default()
    };

    if backups.is_empty() {
        return Ok(summary);
    }

    options.extract_to_subdir = backups.len() > 1;
    if options.extract_to_subdir {
        if let Some(out) = &options.output_dir {
            tokio::fs::create_dir_all(out).await?;
        }
    }

    let options = Arc::new(options);
    let mut tasks = JoinSet::new();

    for backup in backups {
        let options = Arc::clone(&options);
        let keys = Arc::clone(&keys);
        tasks.spawn_blocking(move || {
            let result = extract_backup(&backup, &options, &keys);
            (backup, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((backup, result)) => {
                on_done(&backup, &result);
                match result {
                    Ok(report) => summary.succeeded.push(report),
                    Err(error) => {
                        tracing::warn!("last error processing {}: {error}", backup.display());
                        summary.failed.push(BackupFailure {
                            backup: Some(backup),
                            error,
                        });
                    }
                }
            }
            Err(join_error) => summary.failed.push(BackupFailure {
                backup: None,
                error: ExtractError::TaskFailed(join_error.to_string()),
            }),
        }
    }

    Ok(summary)
}
