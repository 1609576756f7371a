use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    frontmatter::{self, Frontmatter},
};

/// A parsed markdown note from the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultFile {
    /// Absolute path; the unique key in the document store.
    pub path: PathBuf,
    pub title: String,
    /// Markdown body with the frontmatter block removed.
    pub content: String,
    pub frontmatter: Frontmatter,
    /// Frontmatter tags, later unioned with inline hashtags by the enhancer.
    pub tags: Vec<String>,
    /// Wiki and markdown link targets, filled in by the enhancer.
    pub links: Vec<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

impl VaultFile {
    /// The date used for recency ranking: the first parseable frontmatter
    /// date field, else the filesystem modification time.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.frontmatter.effective_date().unwrap_or(self.modified)
    }
}

/// Filesystem facts recorded alongside a parsed note.
#[derive(Debug, Clone, Copy)]
pub struct FileTimes {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

impl FileTimes {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        // Not every filesystem records a birth time.
        let created = meta.created().unwrap_or(modified);
        Self {
            created: DateTime::<Utc>::from(created),
            modified: DateTime::<Utc>::from(modified),
            size: meta.len(),
        }
    }
}

/// Parse raw note text into a [`VaultFile`].
///
/// The title comes from frontmatter `title` or `name`, falling back to the
/// file stem.
pub fn parse_note(path: &Path, raw: &str, times: FileTimes) -> Result<VaultFile> {
    let (frontmatter, body) =
        frontmatter::split(raw).map_err(|reason| Error::Frontmatter {
            path: path.to_path_buf(),
            reason,
        })?;

    let title = frontmatter
        .title()
        .map(str::to_string)
        .unwrap_or_else(|| title_from_path(path));
    let tags = frontmatter.tags();

    Ok(VaultFile {
        path: path.to_path_buf(),
        title,
        content: body.to_string(),
        frontmatter,
        tags,
        links: Vec::new(),
        created: times.created,
        modified: times.modified,
        size: times.size,
    })
}

/// Read and parse a note from disk.
pub fn load_note(path: &Path) -> Result<VaultFile> {
    let raw = std::fs::read_to_string(path)?;
    let meta = std::fs::metadata(path)?;
    parse_note(path, &raw, FileTimes::from_metadata(&meta))
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn times() -> FileTimes {
        let t = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        FileTimes {
            created: t,
            modified: t,
            size: 42,
        }
    }

    #[test]
    fn title_from_frontmatter() {
        let raw = "---\ntitle: Weekly Sync\n---\nNotes";
        let file = parse_note(Path::new("/v/sync.md"), raw, times()).unwrap();
        assert_eq!(file.title, "Weekly Sync");
        assert_eq!(file.content, "Notes");
    }

    #[test]
    fn title_fallback_to_filename() {
        let file =
            parse_note(Path::new("/v/acme-kickoff.md"), "# Heading", times())
                .unwrap();
        assert_eq!(file.title, "acme-kickoff");
    }

    #[test]
    fn tags_from_frontmatter() {
        let raw = "---\ntags: [acme, kickoff]\n---\n";
        let file = parse_note(Path::new("/v/a.md"), raw, times()).unwrap();
        assert_eq!(file.tags, vec!["acme", "kickoff"]);
    }

    #[test]
    fn malformed_frontmatter_names_the_file() {
        let raw = "---\ntitle: [oops\n---\n";
        let err = parse_note(Path::new("/v/bad.md"), raw, times()).unwrap_err();
        match err {
            Error::Frontmatter { path, .. } => {
                assert_eq!(path, Path::new("/v/bad.md"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn effective_date_prefers_frontmatter() {
        let raw = "---\ndate: 2020-02-03\n---\n";
        let file = parse_note(Path::new("/v/a.md"), raw, times()).unwrap();
        let expected = Utc.with_ymd_and_hms(2020, 2, 3, 0, 0, 0).unwrap();
        assert_eq!(file.effective_date(), expected);
    }

    #[test]
    fn effective_date_falls_back_to_mtime() {
        let file = parse_note(Path::new("/v/a.md"), "body", times()).unwrap();
        assert_eq!(file.effective_date(), times().modified);
    }

    #[test]
    fn load_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("note.md");
        let raw = "---\ntitle: On Disk\n---\nhello";
        std::fs::write(&path, raw).unwrap();

        let file = load_note(&path).unwrap();
        assert_eq!(file.title, "On Disk");
        assert_eq!(file.content, "hello");
        assert_eq!(file.size, raw.len() as u64);
    }
}
