//! Shared execution context for every stage that talks to a model.

use std::sync::Arc;

use chrono::Utc;

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, Stage};
use crate::observer::{NoopObserver, PipelineObserver, PromptRecord};
use crate::prompts::PROMPT_VERSION;
use crate::provider::{ProviderConfig, ProviderGateway, ProviderRequest, ProviderResponse};

/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct PipelineContext {
    pub gateway: ProviderGateway,
    /// Sent with every request; there is no global provider selection.
    pub provider: Arc<ProviderConfig>,
    pub settings: Arc<PipelineConfig>,
    pub observer: Arc<dyn PipelineObserver>,
}

impl PipelineContext {
    pub fn new(gateway: ProviderGateway, provider: ProviderConfig, settings: PipelineConfig) -> Self {
        Self {
            gateway,
            provider: Arc::new(provider),
            settings: Arc::new(settings),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Send one request, notifying observers of the prompt and the raw reply.
    pub async fn call(
        &self,
        stage: Stage,
        file: Option<&str>,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, PipelineError> {
        self.observer.prompt_sent(&PromptRecord {
            timestamp: Utc::now(),
            stage,
            file: file.map(str::to_string),
            provider: self.provider.kind.to_string(),
            model: self.provider.model.clone(),
            prompt_version: PROMPT_VERSION.to_string(),
            tool: request.tool_name().map(str::to_string),
            temperature: request.temperature,
            system: request.system.clone(),
            user: request.user.clone(),
        });

        let response = self
            .gateway
            .send(&self.provider, request)
            .await
            .map_err(|e| PipelineError::from_gateway(stage, file, e))?;

        self.observer.raw_response(stage, file, &response);
        Ok(response)
    }
}
