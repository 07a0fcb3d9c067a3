//! Structured-output parsing through a live context: tier ordering and the
//! model-assisted reformat tier.

mod common;

use codesmith::{ProviderResponse, Stage, StopReason, StructuredOutputParser, ToolInvocation};
use coordination::ParseTier;

use common::*;

fn tool_response(raw: &str) -> ProviderResponse {
    ProviderResponse {
        stop_reason: StopReason::ToolUse,
        invocations: vec![ToolInvocation::from_text("write_file", raw)],
        text: None,
        raw_body: String::new(),
    }
}

#[tokio::test]
async fn well_formed_response_never_reaches_later_tiers() {
    // No scripted replies: any model call would fail the parse.
    let transport = ScriptedTransport::new(Vec::new());
    let ctx = context(transport.clone(), settings());
    let parser = StructuredOutputParser::new(&ctx);
    let response = tool_response(r#"{"FilePath":"src/lib.rs","Content":"pub fn a() {}\n"}"#);

    let first = parser
        .parse_files(&response, "write_file", Stage::Synthesize, "src/lib.rs")
        .await
        .unwrap();
    let second = parser
        .parse_files(&response, "write_file", Stage::Synthesize, "src/lib.rs")
        .await
        .unwrap();

    assert_eq!(first.tier, ParseTier::Strict);
    assert!(first.warnings.is_empty());
    assert_eq!(first.items, second.items);
    assert_eq!(first.items[0].content, "pub fn a() {}\n");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn unrecoverable_payload_is_reformatted_by_the_model() {
    let transport = ScriptedTransport::new(vec![text_reply(
        "Here is the code:\n```rust\nfn main() {}\n```\n",
    )]);
    let ctx = context(transport.clone(), settings());
    let parser = StructuredOutputParser::new(&ctx);
    let response = tool_response("fn main() {} <- the model forgot the JSON entirely");

    let parsed = parser
        .parse_files(&response, "write_file", Stage::Synthesize, "src/main.rs")
        .await
        .unwrap();

    assert_eq!(parsed.tier, ParseTier::ModelReformat);
    assert_eq!(parsed.items.len(), 1);
    assert_eq!(parsed.items[0].file_path, "src/main.rs");
    assert_eq!(parsed.items[0].content, "fn main() {}\n");

    // One plain request, no tool forced.
    assert_eq!(transport.tools_called(), vec![None]);
}

#[tokio::test]
async fn reformat_reply_without_a_fence_is_a_parse_error() {
    let transport = ScriptedTransport::new(vec![text_reply("sorry, no code")]);
    let ctx = context(transport, settings());
    let parser = StructuredOutputParser::new(&ctx);

    let err = parser
        .parse_files(&tool_response("garbage"), "write_file", Stage::Merge, "a.rs")
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Merge);
    assert_eq!(err.file(), Some("a.rs"));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn disabled_reformat_fails_without_calling_the_model() {
    let transport = ScriptedTransport::new(Vec::new());
    let mut cfg = settings();
    cfg.model_reformat = false;
    let ctx = context(transport.clone(), cfg);
    let parser = StructuredOutputParser::new(&ctx);

    let err = parser
        .parse_files(&tool_response("garbage"), "write_file", Stage::Synthesize, "a.rs")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("all parse tiers failed"));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn truncated_content_is_salvaged_offline() {
    let transport = ScriptedTransport::new(Vec::new());
    let ctx = context(transport.clone(), settings());
    let parser = StructuredOutputParser::new(&ctx);
    let response = tool_response(r#"{"FilePath":"a.rs","Content":"fn a() {\n    1\n"#);

    let parsed = parser
        .parse_files(&response, "write_file", Stage::Synthesize, "a.rs")
        .await
        .unwrap();

    assert_eq!(parsed.tier, ParseTier::RegexSalvage);
    assert_eq!(parsed.items[0].content, "fn a() {\n    1\n");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn unescaped_quotes_in_code_survive_offline_salvage() {
    let transport = ScriptedTransport::new(Vec::new());
    let ctx = context(transport.clone(), settings());
    let parser = StructuredOutputParser::new(&ctx);
    let response = tool_response(
        r#"{"FilePath": "Hello.cs", "Content": "class Hello {\n  void A() { Debug.Log("hi"); }\n}\n"}"#,
    );

    let parsed = parser
        .parse_files(&response, "write_file", Stage::Synthesize, "Hello.cs")
        .await
        .unwrap();

    assert_eq!(parsed.tier, ParseTier::RegexSalvage);
    assert_eq!(
        parsed.items[0].content,
        "class Hello {\n  void A() { Debug.Log(\"hi\"); }\n}\n"
    );
    assert!(transport.requests().is_empty());
}
