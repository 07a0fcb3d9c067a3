//! Commit writer — the only component that mutates the file system.
//!
//! Every write follows the same discipline:
//!
//! ```text
//! sanitize path ─▶ existing file? ─yes─▶ copy to <backup_dir>/<stamp>/<path>
//!                        │                 append BackupRecord to backups.jsonl
//!                        ▼
//!               normalize line endings ─▶ create parent dirs ─▶ overwrite
//! ```
//!
//! A failed backup aborts the write; the original file is left untouched.

use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::FileArtifact;

/// Name of the append-only backup log inside the backup directory.
pub const BACKUP_LOG: &str = "backups.jsonl";

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("path `{0}` is empty after sanitization")]
    EmptyPath(String),
    #[error("path `{0}` escapes the project root")]
    EscapesRoot(String),
    #[error("backup of `{path}` failed: {source}")]
    Backup {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("write of `{path}` failed: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl CommitError {
    /// The (possibly unsanitized) path the error concerns.
    pub fn path(&self) -> &str {
        match self {
            Self::EmptyPath(p) | Self::EscapesRoot(p) => p,
            Self::Backup { path, .. } | Self::Write { path, .. } => path,
        }
    }
}

// ── Line endings ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    Lf,
    Crlf,
}

impl LineEnding {
    /// The host platform's convention.
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Crlf
        } else {
            Self::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
        }
    }

    /// Rewrite every `\r\n`, lone `\r` and `\n` to this convention.
    pub fn normalize(self, content: &str) -> String {
        let unified = content.replace("\r\n", "\n").replace('\r', "\n");
        match self {
            Self::Lf => unified,
            Self::Crlf => unified.replace('\n', "\r\n"),
        }
    }
}

impl Default for LineEnding {
    fn default() -> Self {
        Self::native()
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// A timestamped copy of a file's pre-write content. Written once, never
/// read back by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Root-relative path of the file that was about to be overwritten.
    pub original: String,
    /// Where the copy lives.
    pub backup_path: PathBuf,
    pub bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// What a successful commit did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Sanitized root-relative path.
    pub path: String,
    pub bytes: usize,
    /// `true` when no file existed at the path before the write.
    pub created: bool,
    pub backup: Option<BackupRecord>,
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct CommitWriter {
    root: PathBuf,
    backup_dir: PathBuf,
    line_ending: LineEnding,
}

impl CommitWriter {
    /// `backup_dir` is taken relative to `root` unless absolute.
    pub fn new(root: impl AsRef<Path>, backup_dir: impl AsRef<Path>, line_ending: LineEnding) -> Self {
        let root = root.as_ref().to_path_buf();
        let backup_dir = if backup_dir.as_ref().is_absolute() {
            backup_dir.as_ref().to_path_buf()
        } else {
            root.join(backup_dir)
        };
        Self {
            root,
            backup_dir,
            line_ending,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn commit(&self, artifact: &FileArtifact) -> Result<CommitReceipt, CommitError> {
        let relative = sanitize_path(&artifact.file_path)?;
        let target = self.root.join(&relative);

        let backup = if target.is_file() {
            Some(self.back_up(&relative, &target)?)
        } else {
            None
        };

        let content = self.line_ending.normalize(&artifact.content);
        let write_err = |source: io::Error| CommitError::Write {
            path: relative.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&target, content.as_bytes()).map_err(write_err)?;

        info!(
            file = %relative,
            bytes = content.len(),
            backed_up = backup.is_some(),
            "file committed"
        );
        Ok(CommitReceipt {
            path: relative,
            bytes: content.len(),
            created: backup.is_none(),
            backup,
        })
    }

    fn back_up(&self, relative: &str, target: &Path) -> Result<BackupRecord, CommitError> {
        let backup_err = |source: io::Error| CommitError::Backup {
            path: relative.to_string(),
            source,
        };
        let now = Utc::now();
        let stamp = now.format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let backup_path = self.backup_dir.join(&stamp).join(relative);
        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent).map_err(backup_err)?;
        }
        let bytes = fs::copy(target, &backup_path).map_err(backup_err)?;

        let record = BackupRecord {
            original: relative.to_string(),
            backup_path,
            bytes,
            created_at: now,
        };
        self.append_log(&record).map_err(backup_err)?;
        debug!(file = %relative, backup = %record.backup_path.display(), "backup written");
        Ok(record)
    }

    fn append_log(&self, record: &BackupRecord) -> io::Result<()> {
        let line = serde_json::to_string(record).map_err(io::Error::other)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.backup_dir.join(BACKUP_LOG))?;
        writeln!(file, "{line}")
    }
}

/// Clean a model-given path into a safe root-relative one.
///
/// Strips surrounding quotes, characters illegal on common file systems
/// (`: * ? " < > |`) and control characters, unifies separators, and
/// rejects any `..` component.
pub fn sanitize_path(raw: &str) -> Result<String, CommitError> {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .chars()
        .filter(|c: &char| !matches!(*c, ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control())
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();

    let mut parts = Vec::new();
    for component in Path::new(&cleaned).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().trim().to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return Err(CommitError::EscapesRoot(raw.to_string())),
        }
    }
    parts.retain(|p| !p.is_empty());
    if parts.is_empty() {
        return Err(CommitError::EmptyPath(raw.to_string()));
    }
    let sanitized = parts.join("/");
    if sanitized != raw {
        warn!(requested = %raw, sanitized = %sanitized, "path sanitized");
    }
    Ok(sanitized)
}
