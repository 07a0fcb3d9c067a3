//! Multi-provider LLM code-synthesis pipeline.
//!
//! | Module        | Role                                                         |
//! |---------------|--------------------------------------------------------------|
//! | `provider`    | `ProviderConfig`, per-provider adapters, `ProviderGateway`   |
//! | `parser`      | structured-output tiers, including the model-assisted one    |
//! | `splitter`    | task → `WorkItem`s (one planning call)                       |
//! | `synthesizer` | `WorkItem` → full-file `FileArtifact`                        |
//! | `reconciler`  | path resolution and the merge call for Modify items          |
//! | `pipeline`    | sequential driver, cooldown, failure propagation             |
//! | `observer`    | prompt audit log, results archive, tracing                   |
//! | `config`      | `codesmith.toml` + environment overrides                     |
//!
//! The network-free pieces (data model, salvage tiers 1–3, path resolution,
//! commits) live in the `coordination` crate.

pub mod config;
pub mod context;
pub mod errors;
pub mod observer;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod reconciler;
pub mod splitter;
pub mod synthesizer;

pub use config::{CodesmithConfig, OnFileError, PipelineConfig};
pub use context::PipelineContext;
pub use errors::{FailureReport, GatewayError, PipelineError, Stage};
pub use observer::{
    NoopObserver, ObserverSet, PipelineObserver, PromptAuditLog, PromptRecord, ResultsArchive,
    TracingObserver,
};
pub use parser::{Parsed, StructuredOutputParser};
pub use pipeline::{Pipeline, PipelineInput, PipelineReport};
pub use provider::{
    ChatTransport, HttpReply, HttpRequest, HttpTransport, ProviderConfig, ProviderGateway,
    ProviderKind, ProviderRequest, ProviderResponse, StopReason, ToolInvocation,
};
pub use reconciler::{Reconciled, Reconciler};
pub use splitter::TaskSplitter;
pub use synthesizer::CodeSynthesizer;
