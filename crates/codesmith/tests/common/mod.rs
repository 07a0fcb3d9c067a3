//! Scripted in-process transport and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use codesmith::config::OnFileError;
use codesmith::{
    ChatTransport, FailureReport, GatewayError, HttpReply, HttpRequest, Pipeline,
    PipelineConfig, PipelineContext, PipelineObserver, ProviderConfig, ProviderGateway,
    ProviderKind,
};
use coordination::{CommitReceipt, CommitWriter, FileArtifact, LineEnding};

/// Replies in order and records every request. Running out of replies is a
/// transport error, so an unexpected extra call fails the item loudly.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<HttpReply>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<HttpReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Tool name forced by each request, `None` for plain requests.
    pub fn tools_called(&self) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|r| {
                r.body
                    .pointer("/tools/0/function/name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpReply, GatewayError> {
        self.seen.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::Transport("script exhausted".into()))
    }
}

/// Observer that keeps what it is told.
#[derive(Default)]
pub struct Recorder {
    pub committed: Mutex<Vec<FileArtifact>>,
    pub failures: Mutex<Vec<FailureReport>>,
}

impl PipelineObserver for Recorder {
    fn file_committed(&self, artifact: &FileArtifact, _receipt: &CommitReceipt) {
        self.committed.lock().unwrap().push(artifact.clone());
    }

    fn failed(&self, report: &FailureReport) {
        self.failures.lock().unwrap().push(report.clone());
    }
}

// ── Reply builders (OpenAI wire shape) ─────────────────────────────

pub fn tool_reply(name: &str, arguments: &str) -> HttpReply {
    HttpReply::ok(&json!({
        "choices": [{
            "finish_reason": "tool_calls",
            "message": {
                "content": null,
                "tool_calls": [{
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                }]
            }
        }]
    }))
}

pub fn text_reply(text: &str) -> HttpReply {
    HttpReply::ok(&json!({
        "choices": [{"finish_reason": "stop", "message": {"content": text}}]
    }))
}

pub fn plan_reply(entries: &[(&str, u8)]) -> HttpReply {
    let files: Vec<Value> = entries
        .iter()
        .map(|(path, id)| json!({"FilePath": path, "TaskId": id}))
        .collect();
    tool_reply("plan_files", &json!({ "Files": files }).to_string())
}

pub fn file_reply(tool: &str, path: &str, content: &str) -> HttpReply {
    tool_reply(
        tool,
        &json!({"FilePath": path, "Content": content}).to_string(),
    )
}

pub fn unauthorized() -> HttpReply {
    HttpReply::new(401, r#"{"error":{"message":"Incorrect API key provided"}}"#)
}

// ── Wiring ─────────────────────────────────────────────────────────

pub fn settings() -> PipelineConfig {
    PipelineConfig {
        cooldown_ms: 0,
        on_file_error: OnFileError::Continue,
        ..PipelineConfig::default()
    }
}

pub fn pipeline(
    root: &Path,
    transport: Arc<ScriptedTransport>,
    settings: PipelineConfig,
    recorder: Arc<Recorder>,
) -> Pipeline {
    let ctx = context(transport, settings).with_observer(recorder);
    let writer = CommitWriter::new(root, ".codesmith/backups", LineEnding::Lf);
    Pipeline::new(ctx, writer)
}

pub fn context(transport: Arc<ScriptedTransport>, settings: PipelineConfig) -> PipelineContext {
    PipelineContext::new(
        ProviderGateway::new(transport),
        ProviderConfig::new(ProviderKind::OpenAi, "sk-test").with_model("gpt-4o-mini"),
        settings,
    )
}
