//! Response generation with a local fallback.
//!
//! [`Generator`] never fails: when the completion backend is unconfigured or
//! misbehaves it answers with [`fallback_response`] instead.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{info, warn};

use crate::{config::GenerationSettings, infra::groq::GroqClient};

const SOURCE: &str = "application::generation";

/// Produces an answer for a trimmed query.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, query: &str) -> String;
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no completion API key configured")]
    MissingCredential,
    #[error("failed to build completion client: {0}")]
    Client(String),
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion backend rejected the credential")]
    Unauthorized,
    #[error("completion backend is rate limiting requests")]
    RateLimited,
    #[error("completion backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response was malformed: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    /// Short label used as a metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            GenerationError::MissingCredential => "unconfigured",
            GenerationError::Client(_) => "client",
            GenerationError::Transport(_) => "transport",
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Unauthorized => "unauthorized",
            GenerationError::RateLimited => "rate_limited",
            GenerationError::Status { .. } => "status",
            GenerationError::MalformedResponse(_) => "malformed",
        }
    }
}

/// Placeholder answer served when no real completion is available.
///
/// The delay approximates backend latency so cached and uncached paths stay
/// distinguishable in timings.
pub async fn fallback_response(query: &str, delay: Duration) -> String {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    format!("Mock AI response to: {query}. (Configure GROQ_API_KEY for real responses)")
}

/// Completion-backed generator. The client is built on first use and reused
/// for the life of the process.
pub struct Generator {
    settings: GenerationSettings,
    client: OnceCell<Option<GroqClient>>,
}

impl Generator {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    /// Whether requests reach the completion backend rather than the fallback.
    pub fn is_live(&self) -> bool {
        self.client().is_some()
    }

    fn client(&self) -> Option<&GroqClient> {
        self.client
            .get_or_init(|| match GroqClient::from_settings(&self.settings) {
                Ok(client) => {
                    info!(
                        target = SOURCE,
                        model = client.model(),
                        "Completion client initialized"
                    );
                    Some(client)
                }
                Err(GenerationError::MissingCredential) => {
                    warn!(
                        target = SOURCE,
                        "GROQ_API_KEY not set; serving mock responses"
                    );
                    None
                }
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        error = %err,
                        "Completion client unavailable; serving mock responses"
                    );
                    None
                }
            })
            .as_ref()
    }

    async fn fallback(&self, query: &str, reason: &'static str) -> String {
        counter!("chatcache_generation_fallback_total", "reason" => reason).increment(1);
        fallback_response(query, self.settings.fallback_delay).await
    }
}

#[async_trait]
impl ResponseGenerator for Generator {
    async fn generate(&self, query: &str) -> String {
        let Some(client) = self.client() else {
            return self.fallback(query, "unconfigured").await;
        };

        match client.complete(query).await {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    reason = err.reason(),
                    "Completion failed; serving mock response"
                );
                self.fallback(query, err.reason()).await
            }
        }
    }
}
