//! Structured-output salvage — offline recovery tiers for tool-call arguments.
//!
//! Models sometimes emit arguments that are almost JSON: invalid `\{` escapes
//! inside code, truncated strings, prose around the object. The three
//! network-free tiers run in order through a [`FallbackChain`]:
//!
//! | Tier            | Input                  | Technique                                  |
//! |-----------------|------------------------|--------------------------------------------|
//! | `strict`        | argument map / raw text | direct keys, or `serde_json` on the raw    |
//! | `brace_escape`  | raw text               | swap `\{` `\}` for sentinels, parse, restore |
//! | `regex_salvage` | raw text               | field-anchored regexes, any field order    |
//!
//! The fourth, model-assisted tier needs a provider and lives with the
//! gateway; it consumes [`loose_content`] / [`loose_path`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::artifact::{FileArtifact, TaskKind, WorkItem};
use crate::resilience::{DegradedResponse, FallbackChain};

pub const TIER_STRICT: &str = "strict";
pub const TIER_BRACE_ESCAPE: &str = "brace_escape";
pub const TIER_REGEX_SALVAGE: &str = "regex_salvage";
pub const TIER_MODEL_REFORMAT: &str = "model_reformat";

/// Private-use code points standing in for `\{` and `\}` during tier 2.
const OPEN_SENTINEL: char = '\u{E000}';
const CLOSE_SENTINEL: char = '\u{E001}';

static PATH_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"(?:file_?path|path|file_?name|file)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("PATH_FIELD_RE regex should compile")
});
static CONTENT_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"content"\s*:\s*""#).expect("CONTENT_START_RE regex should compile")
});
/// What may follow the quote that really closes a content string: another
/// key, the end of the object, or the end of the text.
static FIELD_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:$|,\s*"[A-Za-z_][A-Za-z0-9_-]*"\s*:|\}[ \t]*(?:$|\r?\n|[,\]}]))"#)
        .expect("FIELD_END_RE regex should compile")
});
static LAST_OBJECT_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""\s*\}"#).expect("LAST_OBJECT_CLOSE_RE regex should compile")
});
static TASK_ID_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"task_?id"\s*:\s*"?(\d+)"?"#).expect("TASK_ID_FIELD_RE regex should compile")
});

// ── Tiers ────────────────────────────────────────────────────────────────────

/// Which tier produced a parse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseTier {
    Strict,
    BraceEscape,
    RegexSalvage,
    ModelReformat,
}

impl ParseTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => TIER_STRICT,
            Self::BraceEscape => TIER_BRACE_ESCAPE,
            Self::RegexSalvage => TIER_REGEX_SALVAGE,
            Self::ModelReformat => TIER_MODEL_REFORMAT,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            TIER_STRICT => Some(Self::Strict),
            TIER_BRACE_ESCAPE => Some(Self::BraceEscape),
            TIER_REGEX_SALVAGE => Some(Self::RegexSalvage),
            TIER_MODEL_REFORMAT => Some(Self::ModelReformat),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParseTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The offline chain, highest fidelity first.
pub fn offline_chain() -> FallbackChain {
    FallbackChain::new("structured_output")
        .add_tier(TIER_STRICT, 1.0)
        .add_tier(TIER_BRACE_ESCAPE, 0.9)
        .add_tier(TIER_REGEX_SALVAGE, 0.6)
}

// ── Records ──────────────────────────────────────────────────────────────────

/// The pair of fields a tool record carries besides `FilePath`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// `FilePath` + `Content`: synthesis and merge tools.
    FileContent,
    /// `FilePath` + `TaskId`: the planning tool.
    Plan,
}

impl RecordShape {
    fn value_key(self) -> &'static str {
        match self {
            Self::FileContent => "content",
            Self::Plan => "taskid",
        }
    }
}

const PATH_KEYS: [&str; 4] = ["filepath", "path", "filename", "file"];

/// One recovered `(FilePath, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub file_path: String,
    /// `Content` or `TaskId`, depending on the shape.
    pub value: String,
}

impl ToolRecord {
    pub fn into_artifact(self) -> FileArtifact {
        let content = normalize_escaped_newlines(&self.value);
        FileArtifact::new(self.file_path.trim(), content)
    }

    /// `None` when the `TaskId` is not `0` or `1`.
    pub fn to_work_item(&self) -> Option<WorkItem> {
        let kind = TaskKind::from_task_id(&self.value)?;
        let path = self.file_path.trim();
        if path.is_empty() {
            return None;
        }
        Some(WorkItem::new(path, kind))
    }
}

/// Tool arguments as the gateway delivers them: a flattened map when the
/// provider returned a well-formed object, and the raw text either way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPayload {
    pub arguments: BTreeMap<String, String>,
    pub raw: String,
}

impl ToolPayload {
    pub fn new(arguments: BTreeMap<String, String>, raw: impl Into<String>) -> Self {
        Self {
            arguments,
            raw: raw.into(),
        }
    }

    /// Plain-text path: nothing but the raw string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            arguments: BTreeMap::new(),
            raw: raw.into(),
        }
    }
}

/// Run tiers 1–3 over one payload.
pub fn salvage(payload: &ToolPayload, shape: RecordShape) -> DegradedResponse<Option<Vec<ToolRecord>>> {
    offline_chain().execute(|tier| {
        let records = match tier {
            TIER_STRICT => strict(payload, shape),
            TIER_BRACE_ESCAPE => brace_escape(&payload.raw, shape),
            TIER_REGEX_SALVAGE => regex_salvage(&payload.raw, shape),
            other => Err(format!("unknown tier {other}")),
        }?;
        if records.is_empty() {
            Err("no records recovered".to_string())
        } else {
            Ok(records)
        }
    })
}

// ── Tier 1 ───────────────────────────────────────────────────────────────────

fn strict(payload: &ToolPayload, shape: RecordShape) -> Result<Vec<ToolRecord>, String> {
    if !payload.arguments.is_empty() {
        if let Some(record) = record_from_map(&payload.arguments, shape) {
            return Ok(vec![record]);
        }
        // Batched call: one argument holds a JSON array of records.
        for value in payload.arguments.values() {
            let trimmed = value.trim_start();
            if trimmed.starts_with('[') {
                let parsed: Value = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
                let records = records_from_value(&parsed, shape);
                if !records.is_empty() {
                    return Ok(records);
                }
            }
        }
    }
    parse_records(&payload.raw, shape)
}

fn parse_records(raw: &str, shape: RecordShape) -> Result<Vec<ToolRecord>, String> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|e| e.to_string())?;
    Ok(records_from_value(&value, shape))
}

fn record_from_map(map: &BTreeMap<String, String>, shape: RecordShape) -> Option<ToolRecord> {
    let mut path = None;
    let mut value = None;
    for (key, v) in map {
        let key = fold_key(key);
        if path.is_none() && PATH_KEYS.contains(&key.as_str()) {
            path = Some(v.clone());
        } else if key == shape.value_key() {
            value = Some(v.clone());
        }
    }
    Some(ToolRecord {
        file_path: path?,
        value: value?,
    })
}

fn records_from_value(value: &Value, shape: RecordShape) -> Vec<ToolRecord> {
    match value {
        Value::Array(items) => items
            .iter()
            .flat_map(|item| records_from_value(item, shape))
            .collect(),
        Value::Object(obj) => {
            let flat: BTreeMap<String, String> = obj
                .iter()
                .filter_map(|(k, v)| scalar_text(v).map(|s| (k.clone(), s)))
                .collect();
            if let Some(record) = record_from_map(&flat, shape) {
                return vec![record];
            }
            // Wrapper objects: {"Files": [...]} or {"Files": "[...]"}.
            obj.values()
                .flat_map(|v| match v {
                    Value::Array(_) | Value::Object(_) => records_from_value(v, shape),
                    Value::String(s) if s.trim_start().starts_with('[') => {
                        serde_json::from_str::<Value>(s)
                            .map(|inner| records_from_value(&inner, shape))
                            .unwrap_or_default()
                    }
                    _ => Vec::new(),
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `FilePath`, `filePath`, `file_path` and `file-path` all fold to `filepath`.
fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

// ── Tier 2 ───────────────────────────────────────────────────────────────────

fn brace_escape(raw: &str, shape: RecordShape) -> Result<Vec<ToolRecord>, String> {
    let (escaped, swapped) = swap_escaped_braces(raw);
    if swapped == 0 {
        return Err("no escaped braces to substitute".to_string());
    }
    let records = parse_records(&escaped, shape)?;
    Ok(records
        .into_iter()
        .map(|r| ToolRecord {
            file_path: restore_braces(&r.file_path),
            value: restore_braces(&r.value),
        })
        .collect())
}

/// Replace `\{` / `\}` with sentinels, leaving `\\` pairs intact so an
/// escaped backslash followed by a brace is not misread.
fn swap_escaped_braces(raw: &str) -> (String, usize) {
    let mut out = String::with_capacity(raw.len());
    let mut swapped = 0;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('{') => {
                chars.next();
                out.push(OPEN_SENTINEL);
                swapped += 1;
            }
            Some('}') => {
                chars.next();
                out.push(CLOSE_SENTINEL);
                swapped += 1;
            }
            Some(next) => {
                chars.next();
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    (out, swapped)
}

fn restore_braces(text: &str) -> String {
    text.replace(OPEN_SENTINEL, "{").replace(CLOSE_SENTINEL, "}")
}

// ── Tier 3 ───────────────────────────────────────────────────────────────────

fn regex_salvage(raw: &str, shape: RecordShape) -> Result<Vec<ToolRecord>, String> {
    let paths: Vec<String> = PATH_FIELD_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1).map(|m| unescape_lenient(m.as_str())))
        .collect();
    if paths.is_empty() {
        return Err("no FilePath field found".to_string());
    }

    let values: Vec<String> = match shape {
        RecordShape::FileContent => content_fields(raw),
        RecordShape::Plan => TASK_ID_FIELD_RE
            .captures_iter(raw)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
    };
    if values.is_empty() {
        return Err(format!("no {} field found", shape.value_key()));
    }
    if paths.len() != values.len() {
        warn!(
            paths = paths.len(),
            values = values.len(),
            field = shape.value_key(),
            "regex salvage found unequal field counts, pairing in order"
        );
    }

    Ok(paths
        .into_iter()
        .zip(values)
        .map(|(file_path, value)| ToolRecord { file_path, value })
        .collect())
}

/// Every `"content": "..."` value in the text, decoded.
///
/// A quote ends the value only when a field boundary follows it, so raw
/// quotes inside code (`Log("hi")`) stay part of the content. Without such
/// a quote the value ends at the last `"}` in the text, or runs to the end
/// of the text when the output was truncated.
fn content_fields(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut cursor = 0;
    while let Some(start) = CONTENT_START_RE.find_at(raw, cursor) {
        let body = start.end();
        match closing_quote(raw, body) {
            Some(end) => {
                values.push(unescape_lenient(&raw[body..end]));
                cursor = end + 1;
            }
            None => {
                let tail = &raw[body..];
                let value = LAST_OBJECT_CLOSE_RE
                    .find_iter(tail)
                    .last()
                    .map_or_else(|| trim_truncated(tail), |m| &tail[..m.start()]);
                values.push(unescape_lenient(value));
                break;
            }
        }
    }
    values
}

/// Byte offset of the quote closing the string that starts at `from`.
fn closing_quote(raw: &str, from: usize) -> Option<usize> {
    let mut chars = raw[from..].char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => {
                let at = from + offset;
                if FIELD_END_RE.is_match(&raw[at + 1..]) {
                    return Some(at);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop a dangling `}` and quote from an unterminated value.
fn trim_truncated(tail: &str) -> &str {
    let mut tail = tail.trim_end();
    if let Some(rest) = tail.strip_suffix('}') {
        tail = rest.trim_end();
    }
    tail.strip_suffix('"').unwrap_or(tail)
}

/// Decode JSON string escapes without failing on invalid ones; `\{` becomes
/// `{` and unknown escapes are kept verbatim.
pub fn unescape_lenient(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            '{' => out.push('{'),
            '}' => out.push('}'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                match decode_unit(&hex, &mut chars) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

/// One `\uXXXX` escape. A high surrogate consumes the `\uXXXX` low
/// surrogate that follows it; a lone surrogate is left undecoded.
fn decode_unit(hex: &str, chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let unit = u32::from_str_radix(hex, 16).ok().filter(|_| hex.len() == 4)?;
    if !(0xD800..0xDC00).contains(&unit) {
        return char::from_u32(unit);
    }
    let mut ahead = chars.clone();
    if ahead.next() != Some('\\') || ahead.next() != Some('u') {
        return None;
    }
    let low_hex: String = ahead.by_ref().take(4).collect();
    let low = u32::from_str_radix(&low_hex, 16).ok().filter(|_| low_hex.len() == 4)?;
    if !(0xDC00..0xE000).contains(&low) {
        return None;
    }
    *chars = ahead;
    char::from_u32(0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00))
}

// ── Helpers for the model-assisted tier ──────────────────────────────────────

/// Best-effort file path from raw text, for when every tier failed.
pub fn loose_path(raw: &str) -> Option<String> {
    PATH_FIELD_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| unescape_lenient(m.as_str()))
}

/// Best-effort content from raw text: the content field if one can be
/// found, else the whole text.
pub fn loose_content(raw: &str) -> String {
    content_fields(raw)
        .into_iter()
        .next()
        .unwrap_or_else(|| raw.to_string())
}

// ── Normalization ────────────────────────────────────────────────────────────

/// Turn double-escaped content (literal `\n` / `\r\n` sequences and no real
/// line break) into real line breaks. Content that already has line breaks
/// is returned untouched so escape sequences inside code survive.
pub fn normalize_escaped_newlines(content: &str) -> String {
    if content.contains('\n') || !content.contains("\\n") {
        return content.to_string();
    }
    content.replace("\\r\\n", "\n").replace("\\n", "\n")
}
