//! aip - archival information package builder

use aip_archive::{verify_package, ArchiveRepository};
use aip_common::logging::{init_logging, LogConfig, LogLevel};
use aip_engine::sources::{CsvDataProvider, JsonMetadataProvider};
use aip_engine::{Engine, EngineConfig};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "aip")]
#[command(author, version, about = "Build and verify archival information packages")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive a data source into a package
    Archive {
        /// JSON description of the data source
        #[arg(short, long, env = "AIP_METADATA_FILE")]
        metadata: Option<PathBuf>,

        /// Folder with one `<source name>.csv` per table
        #[arg(short, long, env = "AIP_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Folder receiving the package
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Regular expression selecting target tables
        #[arg(short, long)]
        tables: Option<String>,

        /// Validate only; nothing is written
        #[arg(long)]
        validation_only: bool,

        /// Tables processed at once
        #[arg(short, long)]
        concurrency: Option<i64>,

        /// Override the archive identifier of the data source
        #[arg(long)]
        archive_id: Option<String>,

        /// Source records per block
        #[arg(long)]
        block_size: Option<usize>,

        /// Validators to run (not-null, primary-key); repeat or comma-separate
        #[arg(long, value_delimiter = ',')]
        validators: Option<Vec<String>>,
    },

    /// Check every file of a package against its file index
    Verify {
        /// Folder holding the package
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Archive identifier, e.g. AVID.SA.18000
        #[arg(long)]
        archive_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("aip")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let mut config = EngineConfig::from_env().context("Invalid AIP_* configuration")?;

    match cli.command {
        Command::Archive {
            metadata,
            data_dir,
            output,
            tables,
            validation_only,
            concurrency,
            archive_id,
            block_size,
            validators,
        } => {
            config.metadata_file = metadata.or(config.metadata_file);
            config.data_dir = data_dir.or(config.data_dir);
            config.output_dir = output.unwrap_or(config.output_dir);
            config.table_filter = tables.or(config.table_filter);
            config.validation_only |= validation_only;
            config.concurrency = concurrency.unwrap_or(config.concurrency);
            config.archive_id = archive_id.or(config.archive_id);
            config.block_size = block_size.unwrap_or(config.block_size);
            config.validators = validators.unwrap_or(config.validators);
            config.validate()?;
            archive(&config).await
        }
        Command::Verify { output, archive_id } => {
            let root = output.unwrap_or(config.output_dir);
            verify(root, &archive_id).await
        }
    }
}

async fn archive(config: &EngineConfig) -> Result<()> {
    let Some(metadata_file) = &config.metadata_file else {
        bail!("No metadata file given (--metadata or AIP_METADATA_FILE)");
    };
    let Some(data_dir) = &config.data_dir else {
        bail!("No data directory given (--data-dir or AIP_DATA_DIR)");
    };

    let mut engine = Engine::new(
        Arc::new(JsonMetadataProvider::new(metadata_file)),
        Arc::new(CsvDataProvider::new(data_dir).block_size(config.block_size)),
        Arc::new(Mutex::new(ArchiveRepository::new(&config.output_dir))),
    );
    for kind in config.validator_kinds()? {
        engine = engine.with_validator(kind.build());
    }

    let summary = engine.execute(&config.command()?).await?;
    for table in &summary.tables {
        info!(
            table = %table.table,
            blocks = table.blocks,
            rows_archived = table.rows_archived,
            rows_removed = table.rows_removed,
            conversion_errors = table.conversion_errors,
            "Table summary"
        );
    }
    if let Some(package) = &summary.package {
        info!(package = %package.media_dir.display(), files = package.files, "Package written");
    }
    Ok(())
}

async fn verify(root: PathBuf, archive_id: &str) -> Result<()> {
    let id = archive_id.to_string();
    let verification = tokio::task::spawn_blocking(move || verify_package(root, &id)).await??;
    if !verification.is_ok() {
        for failure in &verification.failures {
            tracing::error!(error = %failure, "Verification failure");
        }
        bail!(
            "{} of {} files failed verification",
            verification.failures.len(),
            verification.checked
        );
    }
    info!(archive_id, files = verification.checked, "Package verified");
    Ok(())
}
