//! Error types for the provider gateway.

use std::time::Duration;
use thiserror::Error;

/// Provider error codes and message fragments that mean the prompt exceeded
/// the model's context window. Retrying such a prompt can never succeed.
const CONTEXT_LENGTH_CODES: &[&str] = &["context_length_exceeded", "string_above_max_length"];
const CONTEXT_LENGTH_MARKERS: &[&str] = &[
    "maximum context length",
    "maximum length",
    "context length",
    "string too long",
    "too many tokens",
];

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "context_length_exceeded").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling the judging provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The prompt is larger than the model accepts. Never retried.
    #[error("prompt too large: {message}")]
    PromptTooLarge {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Rate limited by the provider (HTTP 429).
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: Option<ErrorContext>,
    },

    /// Provider-side or API-level failure.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        context: Option<ErrorContext>,
    },

    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration, Option<ErrorContext>),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),

    /// The retry policy gave up on a transient failure.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Create a prompt-too-large error.
    pub fn prompt_too_large(message: impl Into<String>) -> Self {
        Self::PromptTooLarge {
            message: message.into(),
            context: None,
        }
    }

    /// Create a rate limited error from a provider 429.
    pub fn rate_limited(retry_after: Duration, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: None,
        }
    }

    /// Create a provider error with context.
    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: Some(context),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Build the error for a failed API response, classifying context-length
    /// rejections separately from everything else.
    pub fn from_api_failure(
        provider: &'static str,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        let message = message.into();
        if is_context_length_signal(context.provider_code.as_deref(), &message) {
            return Self::PromptTooLarge {
                message,
                context: Some(context),
            };
        }
        Self::provider_with_context(provider, message, context)
    }

    /// Whether this error may succeed when the same request is sent again.
    ///
    /// Every transport or API failure is retryable except a context-length
    /// rejection and a local configuration problem.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PromptTooLarge { .. } => false,
            Self::Config(_) => false,
            Self::RetriesExhausted { .. } => false,
            Self::RateLimited { .. } => true,
            Self::Provider { .. } => true,
            Self::Timeout(_, _) => true,
            Self::Http(_) => true,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PromptTooLarge { .. } => "prompt_too_large",
            Self::RateLimited { .. } => "rate_limited",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_, _) => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::PromptTooLarge { context, .. } => context.as_ref(),
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            Self::Timeout(_, context) => context.as_ref(),
            Self::RetriesExhausted { last, .. } => last.context(),
            Self::Http(_) => None,
            Self::Config(_) => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

/// Whether a provider error code or message signals a context-length rejection.
pub fn is_context_length_signal(code: Option<&str>, message: &str) -> bool {
    if let Some(code) = code {
        if CONTEXT_LENGTH_CODES.contains(&code) {
            return true;
        }
    }
    let lower = message.to_lowercase();
    CONTEXT_LENGTH_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_length_detected_from_code() {
        assert!(is_context_length_signal(
            Some("context_length_exceeded"),
            "bad request"
        ));
    }

    #[test]
    fn context_length_detected_from_message() {
        assert!(is_context_length_signal(
            None,
            "This model's Maximum Context Length is 128000 tokens."
        ));
        assert!(is_context_length_signal(None, "string too long"));
        assert!(!is_context_length_signal(None, "internal server error"));
    }

    #[test]
    fn api_failure_classification() {
        let err = ProviderError::from_api_failure(
            "chat",
            "maximum context length exceeded",
            ErrorContext::new().with_status(400),
        );
        assert!(matches!(err, ProviderError::PromptTooLarge { .. }));
        assert!(!err.is_retryable());
        assert_eq!(err.context().and_then(|c| c.http_status), Some(400));

        let err =
            ProviderError::from_api_failure("chat", "upstream overloaded", ErrorContext::new());
        assert!(matches!(err, ProviderError::Provider { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(!ProviderError::config("missing key").is_retryable());
        assert_eq!(ProviderError::config("x").code(), "config_error");
    }
}
