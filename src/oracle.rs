//! The judging oracle: one prompt in, free text out.
//!
//! Comparators talk to an [`Oracle`] rather than a concrete chat client, so the
//! ranking engine can run against a scripted stub in tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, Message, ProviderError};

/// What the oracle said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleReply {
    /// Free-text judge output.
    Text(String),
    /// The prompt exceeded the judge's context window. Retrying the same
    /// prompt cannot succeed.
    PromptTooLarge,
}

impl OracleReply {
    pub fn text(&self) -> Option<&str> {
        match self {
            OracleReply::Text(t) => Some(t),
            OracleReply::PromptTooLarge => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Transport failure the client could not recover from.
    #[error("oracle transport failed: {0}")]
    Transport(#[from] ProviderError),
}

/// Per-call context for attribution and logging.
#[derive(Debug, Clone, Default)]
pub struct AskContext {
    pub attribution: Attribution,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn ask(&self, prompt: &str, ctx: &AskContext) -> Result<OracleReply, OracleError>;

    /// Model identifier, for traces.
    fn model(&self) -> &str;
}

#[async_trait]
impl<O: Oracle + ?Sized> Oracle for Arc<O> {
    async fn ask(&self, prompt: &str, ctx: &AskContext) -> Result<OracleReply, OracleError> {
        (**self).ask(prompt, ctx).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Sampling parameters sent with every judge call.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: Option<f32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: Some(0.95),
        }
    }
}

/// Production oracle: a single user message through a [`ChatGateway`].
pub struct ChatOracle<G: ChatGateway + ?Sized> {
    gateway: Arc<G>,
    model: String,
    sampling: SamplingParams,
}

impl<G: ChatGateway + ?Sized> ChatOracle<G> {
    pub fn new(gateway: Arc<G>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }
}

#[async_trait]
impl<G: ChatGateway + ?Sized + 'static> Oracle for ChatOracle<G> {
    async fn ask(&self, prompt: &str, ctx: &AskContext) -> Result<OracleReply, OracleError> {
        let mut request = ChatRequest::new(
            ChatModel::compatible(&self.model),
            vec![Message::user(prompt)],
            ctx.attribution.clone(),
        )
        .temperature(self.sampling.temperature);
        if let Some(top_p) = self.sampling.top_p {
            request = request.top_p(top_p);
        }

        match self.gateway.chat(request).await {
            Ok(resp) => Ok(OracleReply::Text(resp.content)),
            Err(ProviderError::PromptTooLarge { .. }) => Ok(OracleReply::PromptTooLarge),
            Err(err) => Err(OracleError::Transport(err)),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
