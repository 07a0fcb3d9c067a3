//! Work items and file artifacts — the typed handoff between pipeline stages.
//!
//! | Type           | Produced by   | Consumed by                      |
//! |----------------|---------------|----------------------------------|
//! | `WorkItem`     | task splitter | code synthesizer (exactly once)  |
//! | `FileArtifact` | parser        | reconciler, commit writer        |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a planned file is new or an edit of an existing one.
///
/// The wire encoding is the integer `TaskId` the planner tool returns:
/// `0 = Modify`, `1 = Create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Modify,
    Create,
}

impl TaskKind {
    /// Decode a planner `TaskId`. Anything other than `0` or `1` is rejected.
    pub fn from_task_id(raw: &str) -> Option<Self> {
        match raw.trim().trim_matches('"').parse::<i64>().ok()? {
            0 => Some(Self::Modify),
            1 => Some(Self::Create),
            _ => None,
        }
    }

    pub fn task_id(self) -> u8 {
        match self {
            Self::Modify => 0,
            Self::Create => 1,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modify => write!(f, "modify"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// A planned unit of file work. Immutable once the splitter creates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    file_path: String,
    kind: TaskKind,
}

impl WorkItem {
    pub fn new(file_path: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            file_path: file_path.into(),
            kind,
        }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.file_path, self.kind)
    }
}

/// A `(filePath, content)` pair exchanged between every stage after splitting.
///
/// `file_path` may be inexact when it comes straight from a model; the
/// reconciler produces a new artifact with the resolved path rather than
/// mutating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub file_path: String,
    pub content: String,
}

impl FileArtifact {
    pub fn new(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
        }
    }

    /// Same content, different path.
    pub fn with_path(&self, file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: self.content.clone(),
        }
    }

    /// Final path segment, `/` or `\` separated.
    pub fn basename(&self) -> &str {
        basename(&self.file_path)
    }
}

/// Final segment of a `/`- or `\`-separated path.
pub fn basename(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_decoding() {
        assert_eq!(TaskKind::from_task_id("0"), Some(TaskKind::Modify));
        assert_eq!(TaskKind::from_task_id(" 1 "), Some(TaskKind::Create));
        assert_eq!(TaskKind::from_task_id("\"1\""), Some(TaskKind::Create));
        assert_eq!(TaskKind::from_task_id("2"), None);
        assert_eq!(TaskKind::from_task_id("create"), None);
    }

    #[test]
    fn task_id_encoding_and_display() {
        assert_eq!(TaskKind::Modify.task_id(), 0);
        assert_eq!(TaskKind::Create.task_id(), 1);
        assert_eq!(TaskKind::Create.to_string(), "create");
    }

    #[test]
    fn basename_handles_both_separators() {
        assert_eq!(basename("Assets/Scripts/Foo.cs"), "Foo.cs");
        assert_eq!(basename("Assets\\Scripts\\Foo.cs"), "Foo.cs");
        assert_eq!(basename("Foo.cs"), "Foo.cs");
    }

    #[test]
    fn with_path_keeps_content() {
        let a = FileArtifact::new("foo.cs", "class Foo {}");
        let b = a.with_path("Assets/Foo.cs");
        assert_eq!(b.content, a.content);
        assert_eq!(a.file_path, "foo.cs");
        assert_eq!(b.basename(), "Foo.cs");
    }
}
