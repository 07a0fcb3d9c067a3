//! The gateway: pick the adapter for a config, send, classify the reply.
//!
//! | Reply                         | Result                               |
//! |-------------------------------|--------------------------------------|
//! | 2xx, documented shape         | `Ok(ProviderResponse)` (normalized)  |
//! | 400 the adapter can recover   | `Ok(ProviderResponse)`               |
//! | 400 / 401 / 403               | `Err(Auth)`, body never parsed       |
//! | 429                           | `Err(RateLimited)`                   |
//! | other non-2xx                 | `Err(Http)`                          |
//! | 2xx, not JSON / wrong shape   | `Err(Malformed)`                     |

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{ChatTransport, HttpRequest};
use super::{error_message, ProviderConfig, ProviderRequest, ProviderResponse};
use crate::errors::GatewayError;

/// Longest error body excerpt carried into an error message.
const ERROR_EXCERPT_CHARS: usize = 300;

#[derive(Clone)]
pub struct ProviderGateway {
    transport: Arc<dyn ChatTransport>,
}

impl ProviderGateway {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    pub async fn send(
        &self,
        config: &ProviderConfig,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, GatewayError> {
        let adapter = config.kind.adapter();
        let http = HttpRequest {
            url: adapter.endpoint(config),
            headers: adapter.headers(config),
            body: adapter.build_body(config, request),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        };
        debug!(
            provider = %config.kind,
            model = %config.model,
            tool = request.tool_name().unwrap_or("none"),
            "sending provider request"
        );

        let reply = self.transport.post(http).await?;
        let status = reply.status;
        let parsed: Option<Value> = serde_json::from_str(&reply.body).ok();

        if !(200..300).contains(&status) {
            if let Some(body) = &parsed {
                if let Some(recovered) = adapter.recover_error(status, body, request) {
                    return Ok(recovered.normalized());
                }
            }
            let message = parsed
                .as_ref()
                .and_then(|b| {
                    error_message(b, "/error/message").or_else(|| error_message(b, "/error"))
                })
                .unwrap_or_else(|| excerpt(&reply.body));
            warn!(provider = %config.kind, status, message = %message, "provider request failed");
            return Err(match status {
                400 | 401 | 403 => GatewayError::Auth { status, message },
                429 => GatewayError::RateLimited(message),
                _ => GatewayError::Http { status, message },
            });
        }

        let body = parsed.ok_or_else(|| GatewayError::Malformed(excerpt(&reply.body)))?;
        let response = adapter.parse(&body)?.normalized();
        debug!(
            provider = %config.kind,
            stop_reason = %response.stop_reason,
            invocations = response.invocations.len(),
            "provider response parsed"
        );
        Ok(response)
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(ERROR_EXCERPT_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::transport::HttpReply;
    use crate::provider::{ProviderKind, StopReason};
    use async_trait::async_trait;
    use coordination::ToolSchema;
    use serde_json::json;
    use std::sync::Mutex;

    struct OneReply {
        reply: HttpReply,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl ChatTransport for OneReply {
        async fn post(&self, request: HttpRequest) -> Result<HttpReply, GatewayError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn gateway(reply: HttpReply) -> (ProviderGateway, Arc<OneReply>) {
        let transport = Arc::new(OneReply {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (ProviderGateway::new(transport.clone()), transport)
    }

    fn request() -> ProviderRequest {
        ProviderRequest::tool_call("s", "u", 0.4, ToolSchema::write_file())
    }

    #[tokio::test]
    async fn unauthorized_is_auth_error() {
        let (gw, _) = gateway(HttpReply::new(401, r#"{"error":{"message":"invalid x-api-key"}}"#));
        let cfg = ProviderConfig::new(ProviderKind::Anthropic, "bad");
        let err = gw.send(&cfg, &request()).await.unwrap_err();
        match err {
            GatewayError::Auth { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_and_server_errors_are_classified() {
        let cfg = ProviderConfig::new(ProviderKind::OpenAi, "k");
        let (gw, _) = gateway(HttpReply::new(429, "slow down"));
        assert!(matches!(gw.send(&cfg, &request()).await, Err(GatewayError::RateLimited(_))));
        let (gw, _) = gateway(HttpReply::new(503, "<html>busy</html>"));
        assert!(matches!(
            gw.send(&cfg, &request()).await,
            Err(GatewayError::Http { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn groq_failed_generation_is_recovered_not_auth() {
        let body = json!({"error": {"code": "tool_use_failed", "failed_generation": "{\"FilePath\":\"a\"}"}});
        let (gw, _) = gateway(HttpReply::new(400, body.to_string()));
        let cfg = ProviderConfig::new(ProviderKind::Groq, "k");
        let resp = gw.send(&cfg, &request()).await.unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.invocations.len(), 1);
    }

    #[tokio::test]
    async fn request_is_addressed_per_config() {
        let body = json!({"choices": [{"finish_reason": "stop", "message": {"content": "hi"}}]});
        let (gw, seen) = gateway(HttpReply::ok(&body));
        let cfg = ProviderConfig::new(ProviderKind::OpenAi, "sk-1").with_base_url("http://localhost:9000/v1/");
        gw.send(&cfg, &request()).await.unwrap();
        let sent = seen.seen.lock().unwrap();
        assert_eq!(sent[0].url, "http://localhost:9000/v1/chat/completions");
        assert_eq!(sent[0].headers[0].1, "Bearer sk-1");
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let (gw, _) = gateway(HttpReply::new(200, "not json"));
        let cfg = ProviderConfig::new(ProviderKind::Gemini, "k");
        assert!(matches!(gw.send(&cfg, &request()).await, Err(GatewayError::Malformed(_))));
    }
}
