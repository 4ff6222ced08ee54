pub(crate) mod archive;  // Compressed container the backup is written into
pub(crate) mod db_dump;  // Table enumeration and per-table dump files
pub(crate) mod pipeline; // Orchestrates registries, dumps and the archive

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::notify::Notifier;
pub use db_dump::SqlDumpExporter;
pub use pipeline::BackupPipeline;

/// Builds a pipeline from configuration. Paths and databases that fail
/// registration are reported and skipped.
pub async fn build_pipeline(app_config: &AppConfig, notifier: Notifier) -> BackupPipeline {
    let mut pipeline = BackupPipeline::new(Arc::new(SqlDumpExporter), notifier);
    if let Some(temp_dir) = &app_config.temp_dir {
        pipeline = pipeline.with_temp_root(temp_dir);
    }

    let mut skipped = 0;
    for entry in &app_config.paths {
        if pipeline.add_path(&entry.path, entry.relative.as_deref()).is_err() {
            skipped += 1;
        }
    }
    for database in &app_config.databases {
        if pipeline
            .add_database(database.params.clone(), database.tables.clone())
            .await
            .is_err()
        {
            skipped += 1;
        }
    }
    if skipped > 0 {
        println!("⚠️ {} configured source(s) could not be registered and will be skipped.", skipped);
    }
    pipeline
}

/// Public entry point for the backup process: build the archive, then hand it
/// to every configured upload target.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    output: Option<PathBuf>,
    skip_upload: bool,
) -> Result<()> {
    let mut pipeline = build_pipeline(app_config, Notifier::default()).await;

    let target = output.or_else(|| app_config.archive_path.clone());
    let report = pipeline
        .create_backup(target.as_deref())
        .await
        .context("Failed to create backup archive")?;
    println!(
        "✓ Archive {} written: {} file(s), {} table(s)",
        report.archive_path.display(),
        report.files_added,
        report.tables_added
    );

    if skip_upload || app_config.uploads.is_empty() {
        return Ok(());
    }
    crate::upload::run_upload_flow(
        &mut pipeline,
        &app_config.uploads,
        app_config.remove_local_after_upload,
    )
    .await
}
