// serverbackup/src/backup/pipeline.rs
use chrono::{DateTime, Local};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

use super::archive::{ArchiveWriter, TarGzArchiveWriter};
use super::db_dump::DumpExporter;
use crate::errors::{BackupError, Result};
use crate::notify::Notifier;
use crate::registry::{ConnectionParams, DatabaseRegistry, PathEntry, PathRegistry};
use crate::upload::{UploadResult, Uploader};
use crate::utils::{default_archive_name, join_archive_path, to_archive_path};

/// Outcome of one `create_backup` call. Counts cover that call only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub archive_path: PathBuf,
    pub files_added: usize,
    pub tables_added: usize,
    pub temp_files_removed: usize,
}

/// Per-call scratch state. Dump entries never enter the caller's
/// `PathRegistry`, so a second `create_backup` starts clean.
struct ArchiveJob {
    archive_path: PathBuf,
    files_added: usize,
    tables_added: usize,
    dump_entries: Vec<PathEntry>,
    temp_files: Vec<PathBuf>,
    dump_dir: Option<TempDir>,
}

impl ArchiveJob {
    fn new(archive_path: PathBuf) -> Self {
        Self {
            archive_path,
            files_added: 0,
            tables_added: 0,
            dump_entries: Vec::new(),
            temp_files: Vec::new(),
            dump_dir: None,
        }
    }

    /// Best-effort removal of every dump file. Failures are swallowed.
    fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for path in self.temp_files.drain(..) {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        if let Some(dir) = self.dump_dir.take() {
            let _ = dir.close();
        }
        removed
    }
}

/// Explicit target if given, otherwise a timestamped name in the working
/// directory.
fn archive_target(target: Option<&Path>, now: DateTime<Local>) -> PathBuf {
    match target {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(default_archive_name(now)),
    }
}

pub struct BackupPipeline {
    paths: PathRegistry,
    databases: DatabaseRegistry,
    exporter: Arc<dyn DumpExporter>,
    notifier: Notifier,
    temp_root: PathBuf,
    archive_path: Option<PathBuf>,
}

impl BackupPipeline {
    pub fn new(exporter: Arc<dyn DumpExporter>, notifier: Notifier) -> Self {
        Self {
            paths: PathRegistry::new(),
            databases: DatabaseRegistry::new(),
            exporter,
            notifier,
            temp_root: std::env::temp_dir(),
            archive_path: None,
        }
    }

    /// Directory under which per-call dump directories are created.
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    #[cfg(test)]
    pub fn paths(&self) -> &PathRegistry {
        &self.paths
    }

    #[cfg(test)]
    pub fn databases(&self) -> &DatabaseRegistry {
        &self.databases
    }

    /// Registers a file or directory. A missing path is reported to the error
    /// sink and returned; the registry is left untouched.
    pub fn add_path(
        &mut self,
        source_path: impl AsRef<Path>,
        archive_relative_path: Option<&str>,
    ) -> Result<()> {
        match self.paths.register(source_path, archive_relative_path) {
            Ok(entry) => {
                tracing::debug!(
                    source = %entry.source_path().display(),
                    relative = entry.archive_relative_path(),
                    "path registered"
                );
                Ok(())
            }
            Err(err) => Err(self.notifier.report(err)),
        }
    }

    /// Registers a database after probing it. An empty `tables` list selects
    /// every table.
    pub async fn add_database(
        &mut self,
        params: ConnectionParams,
        tables: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        let dsn = params.redacted_dsn();
        match self
            .databases
            .register(self.exporter.as_ref(), params, tables)
            .await
        {
            Ok(_) => {
                tracing::debug!(%dsn, "database registered");
                Ok(())
            }
            Err(err) => Err(self.notifier.report(err)),
        }
    }

    /// Builds one archive from every registered path and database.
    ///
    /// Dump files are removed before returning, whether or not archiving
    /// succeeded. A failed call leaves no archive behind: neither its partial
    /// file nor the one a previous call produced.
    pub async fn create_backup(&mut self, target: Option<&Path>) -> Result<BackupReport> {
        let archive_path = archive_target(target, Local::now());
        self.archive_path = None;

        let writer = match TarGzArchiveWriter::create(&archive_path) {
            Ok(writer) => writer,
            Err(source) => {
                return Err(self.notifier.report(BackupError::ArchiveOpen {
                    path: archive_path,
                    source,
                }));
            }
        };
        self.notifier
            .log(&format!("Creating backup archive: {}", archive_path.display()));

        let mut job = ArchiveJob::new(archive_path);
        let outcome = self.fill_archive(writer, &mut job).await;
        let temp_files_removed = job.cleanup();

        if let Err(err) = outcome {
            let _ = fs::remove_file(&job.archive_path);
            return Err(self.notifier.report(err));
        }

        let resolved = fs::canonicalize(&job.archive_path).unwrap_or_else(|_| job.archive_path.clone());
        self.archive_path = Some(resolved.clone());
        self.notifier.log_with(
            &format!("Backup archive created: {}", resolved.display()),
            json!({ "files": job.files_added, "tables": job.tables_added }),
        );

        Ok(BackupReport {
            archive_path: resolved,
            files_added: job.files_added,
            tables_added: job.tables_added,
            temp_files_removed,
        })
    }

    async fn fill_archive<W: ArchiveWriter>(&self, mut writer: W, job: &mut ArchiveJob) -> Result<()> {
        self.export_databases(job).await?;
        self.archive_files(&mut writer, job)?;
        writer.finish().map_err(|source| BackupError::ArchiveClose {
            path: job.archive_path.clone(),
            source,
        })?;
        Ok(())
    }

    async fn export_databases(&self, job: &mut ArchiveJob) -> Result<()> {
        if self.databases.is_empty() {
            return Ok(());
        }
        self.notifier.log("Backing up databases ...");

        let dump_dir = tempfile::Builder::new()
            .prefix("serverbackup-")
            .tempdir_in(&self.temp_root)?;
        let dump_root = dump_dir.path().to_path_buf();
        job.dump_dir = Some(dump_dir);

        let mut sequence = 0usize;
        for database in self.databases.entries() {
            let params = database.params();
            self.notifier
                .log_with("Backup database", json!({ "dsn": params.redacted_dsn() }));

            for table in self.exporter.list_tables(params).await? {
                if !database.includes_table(&table) {
                    continue;
                }
                sequence += 1;
                let dump_path = dump_root.join(format!("{:02}-{}.sql", sequence, table));
                self.notifier.log(&format!("Backup table: {}", table));

                // Recorded before export so a half-written dump is cleaned up too.
                job.temp_files.push(dump_path.clone());
                self.exporter.export_table(params, &table, &dump_path).await?;

                job.dump_entries
                    .push(PathEntry::new(&dump_path, Some(params.archive_namespace().as_str()))?);
                job.tables_added += 1;
            }
        }
        Ok(())
    }

    fn archive_files<W: ArchiveWriter>(&self, writer: &mut W, job: &mut ArchiveJob) -> Result<()> {
        self.notifier.log("Backing up files ...");

        let entries: Vec<PathEntry> = self
            .paths
            .entries()
            .iter()
            .chain(job.dump_entries.iter())
            .cloned()
            .collect();

        for entry in &entries {
            let root = entry.source_path();
            let prefix = entry.archive_relative_path();

            if root.is_dir() {
                self.notifier
                    .log(&format!("Backup from directory: {}", root.display()));
                for walked in WalkDir::new(root) {
                    let walked = walked.map_err(|e| BackupError::ArchiveAppend {
                        path: root.to_path_buf(),
                        destination: prefix.to_string(),
                        source: e.into(),
                    })?;
                    let path = walked.path();
                    if !path.is_file() {
                        continue;
                    }
                    let rest = path.strip_prefix(root).map(to_archive_path).map_err(|_| {
                        BackupError::InvalidPath {
                            path: path.to_path_buf(),
                        }
                    })?;
                    self.append(writer, job, path, join_archive_path(prefix, &rest))?;
                }
            } else {
                let file_name = root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.append(writer, job, root, join_archive_path(prefix, &file_name))?;
            }
        }

        self.notifier
            .log(&format!("Backed up {} file(s)", job.files_added));
        Ok(())
    }

    fn append<W: ArchiveWriter>(
        &self,
        writer: &mut W,
        job: &mut ArchiveJob,
        path: &Path,
        destination: String,
    ) -> Result<()> {
        tracing::debug!(source = %path.display(), %destination, "adding file");
        writer
            .append_file(path, &destination)
            .map_err(|source| BackupError::ArchiveAppend {
                path: path.to_path_buf(),
                destination,
                source,
            })?;
        job.files_added += 1;
        Ok(())
    }

    /// Absolute path of the last archive this pipeline produced or adopted,
    /// if that file is still on disk.
    pub fn archive_file(&self) -> Option<PathBuf> {
        self.archive_path
            .as_ref()
            .filter(|path| path.is_file())
            .cloned()
    }

    /// Uses an archive built earlier as the upload source.
    pub fn adopt_archive(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(self.notifier.report(BackupError::InvalidPath {
                path: path.to_path_buf(),
            }));
        }
        let resolved = fs::canonicalize(path)?;
        self.archive_path = Some(resolved.clone());
        Ok(resolved)
    }

    /// Sends the current archive to one provider. Fails with `NoArchive`,
    /// before any network I/O, when no archive exists.
    pub async fn upload(
        &mut self,
        uploader: &dyn Uploader,
        remote_path: &str,
        remove_local_after_upload: bool,
    ) -> Result<UploadResult> {
        let Some(archive) = self.archive_file() else {
            return Err(self.notifier.report(BackupError::NoArchive));
        };

        self.notifier.log_with(
            &format!("Uploading {} to {}", archive.display(), uploader.provider()),
            json!({ "remote_path": remote_path }),
        );
        let result = match uploader.upload(&archive, remote_path).await {
            Ok(result) => result,
            Err(err) => return Err(self.notifier.report(err)),
        };
        self.notifier.log_with(
            &format!("Uploaded to {}", uploader.provider()),
            result.provider_metadata.clone(),
        );

        if remove_local_after_upload {
            let _ = fs::remove_file(&archive);
        }
        Ok(result)
    }
}
