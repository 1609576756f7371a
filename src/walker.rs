use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// A discovered markdown file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the vault root.
    pub relative_path: PathBuf,
    /// Path under the canonical vault root. Symlinks are not resolved, so
    /// this matches what the file watcher reports.
    pub absolute_path: PathBuf,
}

/// Markdown file extensions indexed from the vault.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Recursively walk a vault and discover markdown files.
///
/// Skips hidden files and directories (`.obsidian`, `.git`, dotfiles).
/// Symlinks are followed only when they resolve inside the root; links
/// that escape it are rejected with a warning. Unreadable subdirectories
/// are logged and skipped.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    discover_below(&canonical_root, &canonical_root)
}

/// Discover markdown files under `dir`, a directory inside the canonical
/// vault `root`. Relative paths and symlink containment are still measured
/// against `root`, so the results match what [`discover_files`] would list
/// for that subtree.
pub fn discover_below(root: &Path, dir: &Path) -> Result<Vec<DiscoveredFile>> {
    let dir = resolve_in_root(root, dir)?;
    if has_hidden_component(root, &dir) {
        return Ok(Vec::new());
    }
    let mut results = Vec::new();
    walk_dir(root, &dir, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %current.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let file_name = entry.file_name();
        if is_hidden_name(&file_name.to_string_lossy()) {
            continue;
        }

        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if let Err(e) = walk_dir(root, &path, results) {
                warn!(dir = %path.display(), error = %e, "skipping unreadable directory");
            }
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue; // broken symlink
            };
            if !resolved.starts_with(root) {
                warn!(
                    link = %path.display(),
                    target = %resolved.display(),
                    "rejecting symlink that escapes the vault root"
                );
                continue;
            }
            // Linked directories inside the root are already walked.
            if resolved.is_file() && is_markdown(&path) {
                results.push(make_discovered(root, path));
            }
        } else if file_type.is_file() && is_markdown(&path) {
            results.push(make_discovered(root, path));
        }
    }

    Ok(())
}

pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether any component of `path` below `root` is hidden.
pub fn has_hidden_component(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| matches!(c, Component::Normal(name) if is_hidden_name(&name.to_string_lossy())))
}

fn make_discovered(root: &Path, path: PathBuf) -> DiscoveredFile {
    let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
    DiscoveredFile {
        relative_path,
        absolute_path: path,
    }
}

/// Lexically normalize a path, resolving `.` and `..` without touching the
/// filesystem. `..` never climbs above the filesystem root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `requested` (absolute, or relative to `root`) to a path inside
/// the canonical vault `root`.
///
/// The path is normalized first; if it then lies outside the root, or if it
/// exists and its canonical form (symlinks resolved) lies outside the root,
/// the request is rejected with [`Error::PathEscape`].
pub fn resolve_in_root(root: &Path, requested: &Path) -> Result<PathBuf> {
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let normalized = normalize(&joined);

    if !normalized.starts_with(root) {
        return Err(Error::PathEscape(requested.to_path_buf()));
    }

    if let Ok(canonical) = normalized.canonicalize()
        && !canonical.starts_with(root)
    {
        return Err(Error::PathEscape(requested.to_path_buf()));
    }

    Ok(normalized)
}
