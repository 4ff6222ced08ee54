use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Component, Path, PathBuf};
use which::which;

pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Finds a database client tool (`pg_dump`, `mysqldump`, ...) in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).with_context(|| {
        format!(
            "{} executable not found in PATH. Please ensure the database client tools are installed and in your PATH.",
            name
        )
    })
}

/// `backup-YYYY-MM-DD_HH-MM-SS.tar.gz`
pub fn default_archive_name(now: DateTime<Local>) -> String {
    format!(
        "backup-{}.{}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        ARCHIVE_EXTENSION
    )
}

/// Strips leading and trailing `/` and `\` from an archive-relative path.
pub fn trim_separators(relative: &str) -> String {
    relative.trim_matches(|c| c == '/' || c == '\\').to_string()
}

/// Renders a relative filesystem path with `/` separators, the form used for
/// entry names inside the archive.
pub fn to_archive_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins the registered prefix and the entry-specific suffix. An empty prefix
/// places the entry at the archive root.
pub fn join_archive_path(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}/{}", prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_archive_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(default_archive_name(now), "backup-2024-03-09_07-05-01.tar.gz");
    }

    #[test]
    fn test_trim_separators() {
        assert_eq!(trim_separators("/var/www/"), "var/www");
        assert_eq!(trim_separators("\\docs\\"), "docs");
        assert_eq!(trim_separators("///"), "");
        assert_eq!(trim_separators("backup"), "backup");
    }

    #[test]
    fn test_to_archive_path_uses_forward_slashes() {
        let path = Path::new("sub").join("deeper").join("b.txt");
        assert_eq!(to_archive_path(&path), "sub/deeper/b.txt");
        assert_eq!(to_archive_path(Path::new("/var/www")), "var/www");
    }

    #[test]
    fn test_join_archive_path() {
        assert_eq!(join_archive_path("docs", "a.txt"), "docs/a.txt");
        assert_eq!(join_archive_path("", "a.txt"), "a.txt");
    }
}
