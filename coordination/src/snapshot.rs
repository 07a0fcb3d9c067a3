//! Project snapshot — the read-only truth for "does this file exist" and
//! "what is its current content".
//!
//! The snapshot is supplied once at pipeline start and never written by the
//! pipeline. [`SnapshotLoader`] builds one from included files and
//! directories, respecting `.gitignore` via the `ignore` crate.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One file in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Canonical root-relative path with `/` separators.
    pub path: String,
    pub content: String,
}

/// Ordered mapping from canonical path to last-known content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SnapshotEntry>", into = "Vec<SnapshotEntry>")]
pub struct ProjectSnapshot {
    entries: Vec<SnapshotEntry>,
    index: HashMap<String, usize>,
}

// The index is derived from the entries.
impl PartialEq for ProjectSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ProjectSnapshot {}

impl From<Vec<SnapshotEntry>> for ProjectSnapshot {
    fn from(entries: Vec<SnapshotEntry>) -> Self {
        Self::from_entries(entries.into_iter().map(|e| (e.path, e.content)))
    }
}

impl From<ProjectSnapshot> for Vec<SnapshotEntry> {
    fn from(snapshot: ProjectSnapshot) -> Self {
        snapshot.entries
    }
}

impl ProjectSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(path, content)` pairs. A repeated path keeps its first
    /// position and takes the later content.
    pub fn from_entries<I, P, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut snapshot = Self::new();
        for (path, content) in entries {
            snapshot.insert(path, content);
        }
        snapshot
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = canonical_key(&path.into());
        let content = content.into();
        if let Some(&idx) = self.index.get(&path) {
            self.entries[idx].content = content;
            return;
        }
        self.index.insert(path.clone(), self.entries.len());
        self.entries.push(SnapshotEntry { path, content });
    }

    /// Exact (canonical) lookup.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.position(path)
            .map(|idx| self.entries[idx].content.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize for inclusion in a prompt: one fenced block per file, in
    /// snapshot order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(out, "### File: {}", entry.path);
            out.push_str("```\n");
            out.push_str(&entry.content);
            if !entry.content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n\n");
        }
        out
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.index.get(&canonical_key(path)).copied()
    }
}

/// Normalize a path into the snapshot's key form: `/` separators, no
/// leading `./` or `/`.
pub fn canonical_key(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut key = unified.as_str();
    loop {
        if let Some(rest) = key.strip_prefix("./") {
            key = rest;
        } else if let Some(rest) = key.strip_prefix('/') {
            key = rest;
        } else {
            break;
        }
    }
    key.to_string()
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// Reads included files and directories under a project root.
pub struct SnapshotLoader {
    root: PathBuf,
}

impl SnapshotLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Load every included path. Directories are walked recursively,
    /// skipping hidden and gitignored entries. Non-UTF-8 files are skipped.
    pub fn load(&self, includes: &[PathBuf]) -> io::Result<ProjectSnapshot> {
        let mut snapshot = ProjectSnapshot::new();
        for include in includes {
            let full = if include.is_absolute() {
                include.clone()
            } else {
                self.root.join(include)
            };
            if full.is_dir() {
                for file in self.walk(&full) {
                    self.add_file(&mut snapshot, &file)?;
                }
            } else if full.is_file() {
                self.add_file(&mut snapshot, &full)?;
            } else {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("included path not found: {}", full.display()),
                ));
            }
        }
        debug!(files = snapshot.len(), root = %self.root.display(), "snapshot loaded");
        Ok(snapshot)
    }

    fn walk(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkBuilder::new(dir).hidden(true).git_ignore(true).build();
        for entry in walker.flatten() {
            let path = entry.path();
            if path.is_file() {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        files
    }

    fn add_file(&self, snapshot: &mut ProjectSnapshot, file: &Path) -> io::Result<()> {
        let bytes = std::fs::read(file)?;
        let Ok(content) = String::from_utf8(bytes) else {
            warn!(path = %file.display(), "skipping non-UTF-8 file");
            return Ok(());
        };
        let key = file
            .strip_prefix(&self.root)
            .unwrap_or(file)
            .to_string_lossy()
            .into_owned();
        snapshot.insert(key, content);
        Ok(())
    }
}

/// Concatenate memory files in order, one header per file.
pub fn concat_memory_files(files: &[PathBuf]) -> io::Result<String> {
    let mut out = String::new();
    for file in files {
        let text = std::fs::read_to_string(file)?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let _ = writeln!(out, "## Memory: {name}");
        out.push_str(text.trim_end());
        out.push_str("\n\n");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn insert_keeps_order_and_replaces_content() {
        let mut snap = ProjectSnapshot::new();
        snap.insert("b.rs", "1");
        snap.insert("a.rs", "2");
        snap.insert("./b.rs", "3");
        let paths: Vec<_> = snap.paths().collect();
        assert_eq!(paths, vec!["b.rs", "a.rs"]);
        assert_eq!(snap.get("b.rs"), Some("3"));
    }

    #[test]
    fn lookup_normalizes_separators() {
        let snap = ProjectSnapshot::from_entries([("Assets\\Scripts\\Foo.cs", "old")]);
        assert!(snap.contains("Assets/Scripts/Foo.cs"));
        assert!(snap.contains("./Assets/Scripts/Foo.cs"));
        assert!(!snap.contains("Foo.cs"));
    }

    #[test]
    fn render_fences_each_file() {
        let snap = ProjectSnapshot::from_entries([("Foo.cs", "old")]);
        let text = snap.render();
        assert!(text.contains("### File: Foo.cs"));
        assert!(text.contains("```\nold\n```"));
    }

    #[test]
    fn deserialized_snapshot_still_answers_lookups() {
        let snap = ProjectSnapshot::from_entries([("src/a.rs", "x")]);
        let json = serde_json::to_string(&snap).unwrap();
        let back: ProjectSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("src/a.rs"), Some("x"));
    }

    #[test]
    fn loader_walks_directories_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("main.rs"), "fn main() {}").unwrap();
        fs::write(src.join("nested/util.rs"), "pub fn util() {}").unwrap();
        fs::write(src.join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let snap = SnapshotLoader::new(dir.path())
            .load(&[PathBuf::from("src")])
            .unwrap();

        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("src/main.rs"), Some("fn main() {}"));
        assert!(snap.contains("src/nested/util.rs"));
    }

    #[test]
    fn loader_rejects_missing_include() {
        let dir = tempfile::tempdir().unwrap();
        let err = SnapshotLoader::new(dir.path())
            .load(&[PathBuf::from("nope.rs")])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn memory_files_get_headers() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("style.md");
        fs::write(&a, "Use tabs.\n").unwrap();
        let text = concat_memory_files(&[a]).unwrap();
        assert!(text.starts_with("## Memory: style.md\nUse tabs."));
    }
}
