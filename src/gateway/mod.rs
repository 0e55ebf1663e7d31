//! Provider gateway for chat completions.
//!
//! The gateway owns transport-level retry: every failed call is logged and
//! re-sent according to a [`RetryPolicy`], except context-length rejections,
//! which are returned immediately.

pub mod chat_completions;
pub mod error;
pub mod retry;
pub mod types;
pub mod usage;

use std::sync::Arc;

use tokio::time::sleep;
use tracing::warn;

use chat_completions::ChatProvider;

pub use error::{is_context_length_signal, ErrorContext, ProviderError};
pub use retry::RetryPolicy;
pub use types::*;
pub use usage::{CallStatus, NoopUsageSink, ProviderCallRecord, TracingUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub retry: RetryPolicy,
}

pub struct ProviderGateway<U: UsageSink> {
    provider: Arc<dyn ChatProvider>,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<U: UsageSink> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl<U: UsageSink> ProviderGateway<U> {
    pub fn with_config(
        provider: impl ChatProvider + 'static,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            provider: Arc::new(provider),
            usage_sink,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let policy = &self.config.retry;
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            match self.provider.chat(&req).await {
                Ok(resp) => {
                    self.record_usage(&req, &resp, attempts, None).await;
                    return Ok(resp);
                }
                Err(err) => {
                    self.record_usage(&req, &ChatResponse::empty(), attempts, Some(&err))
                        .await;

                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if !policy.allows_another(attempts) {
                        return Err(ProviderError::RetriesExhausted {
                            attempts,
                            last: Box::new(err),
                        });
                    }

                    let delay = policy.delay(attempts - 1);
                    warn!(
                        attempt = attempts,
                        code = err.code(),
                        error = %err,
                        unit = req.attribution.unit_id.as_deref().unwrap_or(""),
                        delay_ms = delay.as_millis() as u64,
                        "API error, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn record_usage(
        &self,
        req: &ChatRequest,
        resp: &ChatResponse,
        attempt: u32,
        error: Option<&ProviderError>,
    ) {
        let record = ProviderCallRecord::new(
            req.model.provider(),
            "chat/completions",
            req.model.model_id(),
            req.attribution.caller,
        )
        .tokens(resp.input_tokens, resp.output_tokens)
        .run(req.attribution.run_id)
        .unit(req.attribution.unit_id.clone())
        .attempt(attempt)
        .latency(resp.latency.as_millis() as u64);

        let record = match error {
            Some(err) => record
                .error(err.code())
                .request_id(err.request_id().map(|s| s.to_string())),
            None => record,
        };

        self.usage_sink.record(record).await;
    }
}
