//! OpenAI chat-completions adapter. Groq reuses the body and parser.

use serde_json::{json, Value};

use super::{
    error_message, ProviderAdapter, ProviderConfig, ProviderKind, ProviderRequest,
    ProviderResponse, StopReason, ToolInvocation,
};
use crate::errors::GatewayError;

pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!("{}/chat/completions", config.base_url())
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        bearer_headers(config)
    }

    fn build_body(&self, config: &ProviderConfig, request: &ProviderRequest) -> Value {
        let choice = request
            .tool_name()
            .map(|name| json!({"type": "function", "function": {"name": name}}));
        chat_body(config, request, choice)
    }

    fn parse(&self, body: &Value) -> Result<ProviderResponse, GatewayError> {
        parse_chat_completion(body)
    }
}

pub(crate) fn bearer_headers(config: &ProviderConfig) -> Vec<(String, String)> {
    vec![(
        "Authorization".to_string(),
        format!("Bearer {}", config.api_key),
    )]
}

/// Chat-completions body; `tool_choice` is only set when a tool is present.
pub(crate) fn chat_body(
    config: &ProviderConfig,
    request: &ProviderRequest,
    tool_choice: Option<Value>,
) -> Value {
    let mut body = json!({
        "model": config.model,
        "temperature": request.temperature,
        "max_tokens": config.max_tokens,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user}
        ]
    });
    if let Some(tool) = &request.tool {
        body["tools"] = json!([{
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters
            }
        }]);
        if let Some(choice) = tool_choice {
            body["tool_choice"] = choice;
        }
    }
    body
}

pub(crate) fn parse_chat_completion(body: &Value) -> Result<ProviderResponse, GatewayError> {
    let choice = body
        .pointer("/choices/0")
        .ok_or_else(|| GatewayError::Malformed(missing_choices(body)))?;
    let message = choice.get("message").cloned().unwrap_or(Value::Null);

    let invocations: Vec<ToolInvocation> = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?;
                    Some(match function.get("arguments") {
                        Some(Value::String(raw)) => ToolInvocation::from_text(name, raw.as_str()),
                        Some(args) => ToolInvocation::from_value(name, args),
                        None => ToolInvocation::from_text(name, ""),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("stop") if !invocations.is_empty() => StopReason::ToolUse,
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some(other) => StopReason::Other(other.to_string()),
        None if !invocations.is_empty() => StopReason::ToolUse,
        None => StopReason::Other("missing finish_reason".to_string()),
    };

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(ProviderResponse {
        stop_reason,
        invocations,
        text,
        raw_body: body.to_string(),
    })
}

fn missing_choices(body: &Value) -> String {
    error_message(body, "/error/message").unwrap_or_else(|| "response has no choices".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::ToolSchema;

    fn config() -> ProviderConfig {
        ProviderConfig::new(ProviderKind::OpenAi, "sk-test").with_model("gpt-4o-mini")
    }

    #[test]
    fn body_forces_the_named_function() {
        let req = ProviderRequest::tool_call("sys", "usr", 0.4, ToolSchema::write_file());
        let body = OpenAiAdapter.build_body(&config(), &req);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["function"]["name"], "write_file");
        assert_eq!(body["tool_choice"]["function"]["name"], "write_file");
    }

    #[test]
    fn plain_request_has_no_tools() {
        let body = OpenAiAdapter.build_body(&config(), &ProviderRequest::plain("s", "u", 0.1));
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn parses_tool_calls_with_string_arguments() {
        let body = json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "type": "function",
                        "function": {
                            "name": "write_file",
                            "arguments": "{\"FilePath\":\"a.rs\",\"Content\":\"fn a() {}\"}"
                        }
                    }]
                }
            }]
        });
        let resp = OpenAiAdapter.parse(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.invocations[0].arguments["FilePath"], "a.rs");
        assert!(resp.text.is_none());
    }

    #[test]
    fn stop_with_tool_calls_counts_as_tool_use() {
        let body = json!({"choices": [{"finish_reason": "stop", "message": {
            "tool_calls": [{"function": {"name": "write_file", "arguments": "{}"}}]
        }}]});
        assert_eq!(OpenAiAdapter.parse(&body).unwrap().stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn text_reply_is_end_turn() {
        let body = json!({"choices": [{"finish_reason": "stop", "message": {"content": "```rs\nx\n```"}}]});
        let resp = OpenAiAdapter.parse(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.text.as_deref(), Some("```rs\nx\n```"));
    }

    #[test]
    fn missing_choices_is_malformed() {
        let err = OpenAiAdapter.parse(&json!({"id": "x"})).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }
}
