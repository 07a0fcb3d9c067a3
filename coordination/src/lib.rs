//! Deterministic core of the codesmith pipeline.
//!
//! Nothing in this crate talks to a model or the network. It owns the data
//! model exchanged between stages, path resolution against the project
//! snapshot, the offline structured-output recovery tiers, and the commit
//! writer that is the only thing allowed to touch the file system.
//!
//! # Modules
//!
//! | Module        | Owns                                                   |
//! |---------------|--------------------------------------------------------|
//! | `artifact`    | `WorkItem`, `TaskKind`, `FileArtifact`                 |
//! | `snapshot`    | `ProjectSnapshot`, `SnapshotLoader`, memory files      |
//! | `resolve`     | `PathResolver`, `ResolutionPolicy`                     |
//! | `resilience`  | `FallbackChain`, `DegradedResponse`                    |
//! | `salvage`     | tiers `strict`, `brace_escape`, `regex_salvage`        |
//! | `tool_schema` | the `write_file` / `merge_file` / `plan_files` tools   |
//! | `commit`      | `CommitWriter`, backups, line endings                  |

pub mod artifact;
pub mod commit;
pub mod resilience;
pub mod resolve;
pub mod salvage;
pub mod snapshot;
pub mod tool_schema;

pub use artifact::{FileArtifact, TaskKind, WorkItem};
pub use commit::{sanitize_path, BackupRecord, CommitError, CommitReceipt, CommitWriter, LineEnding};
pub use resilience::{DegradationLevel, DegradedResponse, FallbackChain, FallbackTier};
pub use resolve::{PathResolver, Resolution, ResolutionPolicy, ResolveError};
pub use salvage::{ParseTier, RecordShape, ToolPayload, ToolRecord};
pub use snapshot::{concat_memory_files, ProjectSnapshot, SnapshotEntry, SnapshotLoader};
pub use tool_schema::ToolSchema;
