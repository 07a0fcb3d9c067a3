//! Gemini generateContent adapter.

use serde_json::{json, Value};

use super::{
    error_message, ProviderAdapter, ProviderConfig, ProviderKind, ProviderRequest,
    ProviderResponse, StopReason, ToolInvocation,
};
use crate::errors::GatewayError;

pub struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!("{}/models/{}:generateContent", config.base_url(), config.model)
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        vec![("x-goog-api-key".to_string(), config.api_key.clone())]
    }

    fn build_body(&self, config: &ProviderConfig, request: &ProviderRequest) -> Value {
        let mut body = json!({
            "systemInstruction": {"parts": [{"text": request.system}]},
            "contents": [{"role": "user", "parts": [{"text": request.user}]}],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": config.max_tokens
            }
        });
        if let Some(tool) = &request.tool {
            body["tools"] = json!([{
                "functionDeclarations": [{
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters
                }]
            }]);
            body["toolConfig"] = json!({
                "functionCallingConfig": {
                    "mode": "ANY",
                    "allowedFunctionNames": [tool.name]
                }
            });
        }
        body
    }

    fn parse(&self, body: &Value) -> Result<ProviderResponse, GatewayError> {
        let candidate = body.pointer("/candidates/0").ok_or_else(|| {
            GatewayError::Malformed(
                error_message(body, "/error/message")
                    .or_else(|| error_message(body, "/promptFeedback/blockReason"))
                    .unwrap_or_else(|| "response has no candidates".to_string()),
            )
        })?;

        let mut invocations = Vec::new();
        let mut text = String::new();
        let parts = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in &parts {
            if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
                let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                invocations.push(ToolInvocation::from_value(name, &args));
            } else if let Some(t) = part.get("text").and_then(Value::as_str) {
                text.push_str(t);
            }
        }

        let stop_reason = match candidate.get("finishReason").and_then(Value::as_str) {
            Some("STOP") if !invocations.is_empty() => StopReason::ToolUse,
            Some("STOP") => StopReason::EndTurn,
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some(other) => StopReason::Other(other.to_string()),
            None if !invocations.is_empty() => StopReason::ToolUse,
            None => StopReason::Other("missing finishReason".to_string()),
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
    fn body_restricts_calls_to_the_tool() {
        let cfg = ProviderConfig::new(ProviderKind::Gemini, "g").with_model("gemini-2.0-flash");
        let req = ProviderRequest::tool_call("sys", "usr", 0.4, ToolSchema::write_file());
        let body = GeminiAdapter.build_body(&cfg, &req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "write_file"
        );
        assert!(GeminiAdapter
            .endpoint(&cfg)
            .ends_with("/models/gemini-2.0-flash:generateContent"));
    }

    #[test]
    fn plan_declaration_has_no_integer_enum() {
        let cfg = ProviderConfig::new(ProviderKind::Gemini, "g").with_model("gemini-2.0-flash");
        let req = ProviderRequest::tool_call("sys", "usr", 0.2, ToolSchema::plan_files());
        let body = GeminiAdapter.build_body(&cfg, &req);
        let task_id = body
            .pointer("/tools/0/functionDeclarations/0/parameters/properties/Files/items/properties/TaskId")
            .unwrap();
        assert_eq!(task_id["type"], "integer");
        assert!(task_id.get("enum").is_none());
    }

    #[test]
    fn stop_with_function_call_is_tool_use() {
        let body = json!({"candidates": [{
            "finishReason": "STOP",
            "content": {"parts": [
                {"functionCall": {"name": "plan_files", "args": {
                    "Files": [{"FilePath": "Foo.cs", "TaskId": 0}]
                }}}
            ]}
        }]});
        let resp = GeminiAdapter.parse(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert!(resp.invocations[0].arguments["Files"].starts_with('['));
    }

    #[test]
    fn safety_stop_is_other() {
        let body = json!({"candidates": [{"finishReason": "SAFETY", "content": {"parts": []}}]});
        let resp = GeminiAdapter.parse(&body).unwrap().normalized();
        assert!(resp.is_empty());
    }
}
