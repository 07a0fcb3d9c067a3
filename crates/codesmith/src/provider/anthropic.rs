//! Anthropic messages adapter.

use serde_json::{json, Value};

use super::{
    error_message, ProviderAdapter, ProviderConfig, ProviderKind, ProviderRequest,
    ProviderResponse, StopReason, ToolInvocation,
};
use crate::errors::GatewayError;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!("{}/messages", config.base_url())
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), config.api_key.clone()),
            ("anthropic-version".to_string(), API_VERSION.to_string()),
        ]
    }

    fn build_body(&self, config: &ProviderConfig, request: &ProviderRequest) -> Value {
        let mut body = json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [{"role": "user", "content": request.user}]
        });
        if let Some(tool) = &request.tool {
            body["tools"] = json!([{
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters
            }]);
            body["tool_choice"] = json!({"type": "tool", "name": tool.name});
        }
        body
    }

    fn parse(&self, body: &Value) -> Result<ProviderResponse, GatewayError> {
        let blocks = body.get("content").and_then(Value::as_array).ok_or_else(|| {
            GatewayError::Malformed(
                error_message(body, "/error/message")
                    .unwrap_or_else(|| "response has no content blocks".to_string()),
            )
        })?;

        let mut invocations = Vec::new();
        let mut text = String::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("tool_use") => {
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    invocations.push(ToolInvocation::from_value(name, &input));
                }
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(Value::as_str) {
                        text.push_str(t);
                    }
                }
                _ => {}
            }
        }

        let stop_reason = match body.get("stop_reason").and_then(Value::as_str) {
            Some("tool_use") => StopReason::ToolUse,
            Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
            Some("max_tokens") => StopReason::MaxTokens,
            Some(other) => StopReason::Other(other.to_string()),
            None => StopReason::Other("missing stop_reason".to_string()),
        };

        Ok(ProviderResponse {
            stop_reason,
            invocations,
            text: (!text.is_empty()).then_some(text),
            raw_body: body.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::ToolSchema;

    #[test]
    fn body_uses_top_level_system_and_input_schema() {
        let cfg = ProviderConfig::new(ProviderKind::Anthropic, "ak");
        let req = ProviderRequest::tool_call("sys", "usr", 0.2, ToolSchema::plan_files());
        let body = AnthropicAdapter.build_body(&cfg, &req);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["content"], "usr");
        assert!(body["tools"][0]["input_schema"].is_object());
        assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "plan_files"}));
        let headers = AnthropicAdapter.headers(&cfg);
        assert!(headers.iter().any(|(k, v)| k == "x-api-key" && v == "ak"));
    }

    #[test]
    fn parses_tool_use_blocks() {
        let body = json!({
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Writing the file."},
                {"type": "tool_use", "id": "t1", "name": "write_file",
                 "input": {"FilePath": "Bar.cs", "Content": "class Bar {}"}}
            ]
        });
        let resp = AnthropicAdapter.parse(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.invocations[0].arguments["Content"], "class Bar {}");
        assert_eq!(resp.text.as_deref(), Some("Writing the file."));
    }

    #[test]
    fn unknown_stop_reason_is_other() {
        let body = json!({"stop_reason": "refusal", "content": []});
        let resp = AnthropicAdapter.parse(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::Other("refusal".into()));
    }
}
