//! Command-line interface for decrypting Home Assistant backups.
//!
//! Extracts one or more backup `.tar` files, decrypting their inner archives
//! with the backup encryption key taken from `--password`, an emergency kit
//! file, or an interactive prompt.

mod datasize;
mod prompt;

use clap::{Parser, Subcommand};
use datasize::parse_data_size;
use habackup::{
    extract_backups, BackupFailure, BatchSummary, EntryFilter, ExtractOptions, KeySource,
    KeyStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use prompt::PromptingResolver;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.blue} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}";

#[derive(Parser)]
#[command(name = "ha-backup-tool")]
#[command(version, about = "Decrypt and extract Home Assistant backups", long_about = None)]
struct Cli {
    /// Emergency kit file containing the encryption key
    #[arg(short, long, global = true, env = "HA_BACKUP_EMERGENCY_KIT")]
    emergency: Option<PathBuf>,

    /// Backup encryption key (XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX)
    #[arg(
        short,
        long,
        global = true,
        env = "HA_BACKUP_PASSWORD",
        hide_env_values = true
    )]
    password: Option<String>,

    /// Largest single file to extract, e.g. 500GB or 64MiB. Units always
    /// count bytes, in any letter case: KB = 1000 bytes, KiB = 1024 bytes
    #[arg(long, global = true, value_parser = parse_data_size, default_value = "500GB")]
    max_archive_size: u64,

    /// Show debug logs and full error details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt and extract one or more backups
    #[command(visible_aliases = ["unpack", "e", "u"])]
    Extract {
        /// Backup files to extract
        #[arg(required = true)]
        backups: Vec<PathBuf>,

        /// Comma separated glob patterns of entries to extract
        #[arg(long, visible_alias = "ic", default_value = "")]
        include: String,

        /// Comma separated glob patterns of entries to skip
        #[arg(long, visible_alias = "ec", default_value = "")]
        exclude: String,

        /// Output directory, defaults to next to each backup
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not create symbolic and hard links
        #[arg(long)]
        skip_create_links: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;

    match result {
        Ok(summary) if summary.is_success() => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let keys = KeySource::new(cli.password, cli.emergency);

    match cli.command {
        Commands::Extract {
            backups,
            include,
            exclude,
            output,
            skip_create_links,
        } => {
            let options = build_options(
                &include,
                &exclude,
                output,
                skip_create_links,
                cli.max_archive_size,
                cli.verbose,
            )?;
            handle_extract(backups, options, keys).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

fn build_options(
    include: &str,
    exclude: &str,
    output: Option<PathBuf>,
    skip_create_links: bool,
    max_archive_size: u64,
    verbose: bool,
) -> Result<ExtractOptions, Box<dyn std::error::Error>> {
    Ok(ExtractOptions {
        filter: EntryFilter::from_globs(include, exclude)?,
        output_dir: output,
        extract_to_subdir: false,
        skip_create_links,
        max_archive_size,
        verbose,
    })
}

async fn handle_extract(
    backups: Vec<PathBuf>,
    options: ExtractOptions,
    keys: KeySource,
) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let progress = ProgressBar::new(backups.len() as u64);
    progress.set_style(ProgressStyle::with_template(PROGRESS_TEMPLATE)?);

    let keys = Arc::new(KeyStore::new(PromptingResolver::new(keys, progress.clone())));

    let summary = extract_backups(backups, options, keys, |backup, result| {
        let name = backup
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match result {
            Ok(_) => progress.set_message(format!("{name} done")),
            Err(_) => progress.set_message(format!("{name} failed")),
        }
        progress.inc(1);
    })
    .await?;

    progress.finish_and_clear();

    for failure in &summary.failed {
        tracing::error!("{}", failure_message(failure));
    }

    println!(
        "Successfully decrypted {} of {} backup file(s)",
        summary.succeeded.len(),
        summary.total
    );

    Ok(summary)
}

fn failure_message(failure: &BackupFailure) -> String {
    let backup = failure
        .backup
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());

    if failure.error.may_be_wrong_key() {
        format!(
            "Failed {backup}: {} (possible wrong password or broken file)",
            failure.error
        )
    } else {
        format!("Failed {backup}: {}", failure.error)
    }
}
