// serverbackup/src/backup/archive.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;

/// Append-only sink for archive entries.
pub trait ArchiveWriter {
    /// Adds the file at `source` under the entry name `destination`.
    fn append_file(&mut self, source: &Path, destination: &str) -> io::Result<()>;

    /// Flushes and seals the container. The writer is unusable afterwards.
    fn finish(self) -> io::Result<PathBuf>;
}

/// GZipped TAR archive.
pub struct TarGzArchiveWriter {
    path: PathBuf,
    builder: Builder<GzEncoder<File>>,
}

impl TarGzArchiveWriter {
    /// Creates (or truncates) the archive at `path`, creating missing parent
    /// directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(true);
        Ok(Self {
            path: path.to_path_buf(),
            builder,
        })
    }
}

impl ArchiveWriter for TarGzArchiveWriter {
    fn append_file(&mut self, source: &Path, destination: &str) -> io::Result<()> {
        self.builder.append_path_with_name(source, destination)
    }

    fn finish(self) -> io::Result<PathBuf> {
        let encoder = self.builder.into_inner()?;
        encoder.finish()?;
        Ok(self.path)
    }
}

/// Entry names of a `.tar.gz` archive, in archive order.
#[cfg(test)]
pub(crate) fn list_entries(archive_path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_written_entries_read_back() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, "alpha").unwrap();
        let archive_path = temp.path().join("out.tar.gz");

        let mut writer = TarGzArchiveWriter::create(&archive_path).unwrap();
        writer.append_file(&source, "docs/a.txt").unwrap();
        writer.append_file(&source, "copy/a.txt").unwrap();
        let finished = writer.finish().unwrap();

        assert_eq!(finished, archive_path);
        assert_eq!(
            list_entries(&archive_path).unwrap(),
            vec!["docs/a.txt", "copy/a.txt"]
        );

        let file = File::open(&archive_path).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut first = archive.entries().unwrap().next().unwrap().unwrap();
        let mut content = String::new();
        first.read_to_string(&mut content).unwrap();
        assert_eq!(content, "alpha");
    }

    #[test]
    fn test_create_truncates_and_makes_parents() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("nested/dir/out.tar.gz");
        fs::create_dir_all(archive_path.parent().unwrap()).unwrap();
        fs::write(&archive_path, "stale contents").unwrap();

        let writer = TarGzArchiveWriter::create(&archive_path).unwrap();
        writer.finish().unwrap();

        assert!(list_entries(&archive_path).unwrap().is_empty());

        let fresh = temp.path().join("a/b/c.tar.gz");
        TarGzArchiveWriter::create(&fresh).unwrap().finish().unwrap();
        assert!(fresh.is_file());
    }

    #[test]
    fn test_missing_source_fails_append() {
        let temp = TempDir::new().unwrap();
        let mut writer = TarGzArchiveWriter::create(&temp.path().join("out.tar.gz")).unwrap();
        assert!(writer
            .append_file(&temp.path().join("gone.txt"), "gone.txt")
            .is_err());
    }
}
