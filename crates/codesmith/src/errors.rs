//! Error taxonomy for the gateway and the pipeline.
//!
//! Every failure names the stage and, where there is one, the file it
//! concerns. Callers ask `is_fatal()` instead of matching on strings.
//!
//! ## Propagation
//!
//! | Error            | Fatal | Effect                                   |
//! |------------------|-------|------------------------------------------|
//! | Auth             | yes   | stops the remaining work-item queue      |
//! | NoTasks          | n/a   | nothing was planned, the run ends        |
//! | Parse            | no    | aborts the current file task             |
//! | PathResolution   | no    | aborts the current file task             |
//! | Merge            | no    | aborts the current file task             |
//! | Io               | no    | aborts the current file task             |
//! | Inference        | no    | aborts the current file task             |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use coordination::CommitError;

// ── Gateway ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP 400/401/403: bad credentials or a request the provider refuses.
    #[error("authentication or bad request (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The provider replied 2xx but the body is not the documented shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Synthesize,
    Reconcile,
    Merge,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Synthesize => write!(f, "synthesize"),
            Self::Reconcile => write!(f, "reconcile"),
            Self::Merge => write!(f, "merge"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

fn file_label(file: &Option<String>) -> &str {
    file.as_deref().unwrap_or("<task>")
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("[{stage}] authentication failure for {}: {reason}", file_label(.file))]
    Auth {
        stage: Stage,
        file: Option<String>,
        reason: String,
    },

    #[error("[{stage}] could not parse model output for {}: {reason}", file_label(.file))]
    Parse {
        stage: Stage,
        file: Option<String>,
        reason: String,
    },

    #[error("[reconcile] cannot resolve path `{file}`: {reason}")]
    PathResolution { file: String, reason: String },

    #[error("[merge] merge failed for `{file}`: {reason}")]
    Merge { file: String, reason: String },

    #[error("[commit] {source}")]
    Io {
        file: String,
        #[source]
        source: CommitError,
    },

    #[error("[plan] No file tasks received")]
    NoTasks,

    #[error("[{stage}] inference failure for {}: {reason}", file_label(.file))]
    Inference {
        stage: Stage,
        file: Option<String>,
        reason: String,
    },
}

impl PipelineError {
    /// Fatal errors stop the whole queue; everything else aborts one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Auth { stage, .. } | Self::Parse { stage, .. } | Self::Inference { stage, .. } => {
                *stage
            }
            Self::PathResolution { .. } => Stage::Reconcile,
            Self::Merge { .. } => Stage::Merge,
            Self::Io { .. } => Stage::Commit,
            Self::NoTasks => Stage::Plan,
        }
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Auth { file, .. } | Self::Parse { file, .. } | Self::Inference { file, .. } => {
                file.as_deref()
            }
            Self::PathResolution { file, .. } | Self::Merge { file, .. } | Self::Io { file, .. } => {
                Some(file)
            }
            Self::NoTasks => None,
        }
    }

    /// Map a gateway failure raised while working on `file` in `stage`.
    pub fn from_gateway(stage: Stage, file: Option<&str>, err: GatewayError) -> Self {
        let file = file.map(str::to_string);
        match err {
            GatewayError::Auth { .. } => Self::Auth {
                stage,
                file,
                reason: err.to_string(),
            },
            other => Self::Inference {
                stage,
                file,
                reason: other.to_string(),
            },
        }
    }

    pub fn parse(stage: Stage, file: Option<&str>, reason: impl Into<String>) -> Self {
        Self::Parse {
            stage,
            file: file.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn report(&self) -> FailureReport {
        FailureReport {
            stage: self.stage(),
            file_path: self.file().map(str::to_string),
            reason: self.to_string(),
            fatal: self.is_fatal(),
        }
    }
}

/// What observers receive when a task or the whole run aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub stage: Stage,
    pub file_path: Option<String>,
    pub reason: String,
    pub fatal: bool,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_is_fatal() {
        let auth = PipelineError::from_gateway(
            Stage::Plan,
            None,
            GatewayError::Auth {
                status: 401,
                message: "bad key".into(),
            },
        );
        assert!(auth.is_fatal());
        assert!(!PipelineError::parse(Stage::Synthesize, Some("a.rs"), "x").is_fatal());
        assert!(!PipelineError::NoTasks.is_fatal());
    }

    #[test]
    fn non_auth_gateway_errors_become_inference_failures() {
        let err = PipelineError::from_gateway(
            Stage::Merge,
            Some("Foo.cs"),
            GatewayError::RateLimited("slow down".into()),
        );
        assert!(matches!(err, PipelineError::Inference { .. }));
        assert_eq!(err.stage(), Stage::Merge);
        assert_eq!(err.file(), Some("Foo.cs"));
    }

    #[test]
    fn reports_name_stage_and_file() {
        let report = PipelineError::Merge {
            file: "src/a.rs".into(),
            reason: "no old content".into(),
        }
        .report();
        assert_eq!(report.stage, Stage::Merge);
        assert_eq!(report.file_path.as_deref(), Some("src/a.rs"));
        assert!(report.reason.contains("src/a.rs"));
        assert!(!report.fatal);
    }

    #[test]
    fn no_tasks_reason_is_specific() {
        assert_eq!(PipelineError::NoTasks.to_string(), "[plan] No file tasks received");
    }
}
