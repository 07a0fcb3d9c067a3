//! Provider gateway — one normalized tool-call contract over four APIs.
//!
//! ```text
//! ProviderRequest ──adapter.build_body──▶ HttpRequest ──ChatTransport──▶ HttpReply
//!                                                                          │
//! ProviderResponse ◀──────────────adapter.parse (or recover_error)─────────┘
//! ```
//!
//! | Kind      | API                         | Tool-call shape                          |
//! |-----------|-----------------------------|------------------------------------------|
//! | openai    | chat completions            | `tool_calls[].function.arguments` (text) |
//! | anthropic | messages                    | `content[]` blocks of `type: tool_use`   |
//! | gemini    | generateContent             | `parts[].functionCall.args`              |
//! | groq      | OpenAI-compatible           | as openai, plus `tool_use_failed` salvage |
//!
//! The gateway knows nothing about files or merging.

pub mod anthropic;
pub mod gateway;
pub mod gemini;
pub mod groq;
pub mod openai;
pub mod transport;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use coordination::{ToolPayload, ToolSchema};

use crate::errors::GatewayError;

pub use gateway::ProviderGateway;
pub use transport::{ChatTransport, HttpReply, HttpRequest, HttpTransport};

// ── Provider selection ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "open_ai")]
    OpenAi,
    Anthropic,
    Gemini,
    Groq,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Groq => "groq",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Gemini => "gemini-1.5-pro",
            Self::Groq => "llama-3.3-70b-versatile",
        }
    }

    pub fn default_api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Groq => "https://api.groq.com/openai/v1",
        }
    }

    /// The adapter that speaks this provider's wire shape.
    pub fn adapter(self) -> &'static dyn ProviderAdapter {
        match self {
            Self::OpenAi => &openai::OpenAiAdapter,
            Self::Anthropic => &anthropic::AnthropicAdapter,
            Self::Gemini => &gemini::GeminiAdapter,
            Self::Groq => &groq::GroqAdapter,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "groq" => Ok(Self::Groq),
            other => Err(format!("unknown provider `{other}`")),
        }
    }
}

/// Everything needed to address one provider. Passed explicitly with every
/// request; there is no process-wide "current provider".
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    /// Overrides the provider's public endpoint (proxies, compatible servers).
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            model: kind.default_model().to_string(),
            api_key: api_key.into(),
            base_url: None,
            max_tokens: 8_192,
            timeout_secs: 120,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
            .trim_end_matches('/')
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Normalized contract ──────────────────────────────────────────────────────

/// A tool-constrained chat request. `tool == None` is a plain completion,
/// used only by the reformat tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub tool: Option<ToolSchema>,
}

impl ProviderRequest {
    pub fn tool_call(
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
        tool: ToolSchema,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
            tool: Some(tool),
        }
    }

    pub fn plain(system: impl Into<String>, user: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
            tool: None,
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_ref().map(|t| t.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ToolUse,
    EndTurn,
    MaxTokens,
    Other(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolUse => write!(f, "tool_use"),
            Self::EndTurn => write!(f, "end_turn"),
            Self::MaxTokens => write!(f, "max_tokens"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// One named tool call with flattened arguments and the raw argument text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: BTreeMap<String, String>,
    pub raw_arguments: String,
}

impl ToolInvocation {
    /// From an argument value that arrived as JSON.
    pub fn from_value(name: impl Into<String>, args: &Value) -> Self {
        Self {
            name: name.into(),
            arguments: flatten_arguments(args),
            raw_arguments: args.to_string(),
        }
    }

    /// From argument text (OpenAI-style). Unparseable text keeps an empty map
    /// and is left to the salvage tiers.
    pub fn from_text(name: impl Into<String>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let arguments = serde_json::from_str::<Value>(&raw)
            .map(|v| flatten_arguments(&v))
            .unwrap_or_default();
        Self {
            name: name.into(),
            arguments,
            raw_arguments: raw,
        }
    }

    pub fn to_payload(&self) -> ToolPayload {
        ToolPayload::new(self.arguments.clone(), self.raw_arguments.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub stop_reason: StopReason,
    pub invocations: Vec<ToolInvocation>,
    /// Free text the model produced alongside (or instead of) tool calls.
    pub text: Option<String>,
    /// The provider's raw reply body, kept for the results archive.
    #[serde(skip)]
    pub raw_body: String,
}

impl ProviderResponse {
    /// An unrecognized stop reason counts as an empty response.
    pub fn normalized(mut self) -> Self {
        if let StopReason::Other(reason) = &self.stop_reason {
            tracing::warn!(stop_reason = %reason, "unrecognized stop reason, dropping output");
            self.invocations.clear();
            self.text = None;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty() && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

/// Translates between the normalized contract and one provider's wire shape.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn endpoint(&self, config: &ProviderConfig) -> String;

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)>;

    fn build_body(&self, config: &ProviderConfig, request: &ProviderRequest) -> Value;

    fn parse(&self, body: &Value) -> Result<ProviderResponse, GatewayError>;

    /// Turn an error reply into a response when the provider embeds the
    /// model's output in it.
    fn recover_error(
        &self,
        _status: u16,
        _body: &Value,
        _request: &ProviderRequest,
    ) -> Option<ProviderResponse> {
        None
    }
}

/// Flatten a tool argument object into a string map.
///
/// Strings pass through verbatim, other scalars are stringified, arrays are
/// kept as JSON text, and nested objects are lifted one level without
/// overwriting top-level keys.
pub fn flatten_arguments(args: &Value) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    let Value::Object(obj) = args else {
        return flat;
    };
    let mut nested = Vec::new();
    for (key, value) in obj {
        match value {
            Value::Object(inner) => nested.push(inner),
            other => {
                if let Some(text) = value_text(other) {
                    flat.insert(key.clone(), text);
                }
            }
        }
    }
    for inner in nested {
        for (key, value) in inner {
            if let Some(text) = value_text(value) {
                flat.entry(key.clone()).or_insert(text);
            }
        }
    }
    flat
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// First string found at `pointer` in `body`, for error messages.
pub(crate) fn error_message(body: &Value, pointer: &str) -> Option<String> {
    body.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}
