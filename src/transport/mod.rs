pub mod rate_limit;

use crate::errors::TranslateError;
use rate_limit::TokenBucket;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Settings that shape every call made through a `Transport`; owned by the
/// caller (normally the loaded run configuration) and cloned in cheaply.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Shared gateway to the chat-completions endpoint: bounds concurrency with
/// a semaphore, bounds request rate with a token bucket, and absorbs
/// transient failures with a short exponential-ish backoff.
///
/// Cloning is cheap; every field is an `Arc`, so a single `Transport` is
/// meant to be shared across every concurrent translation task in a run.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    settings: Arc<TransportSettings>,
    gate: Arc<Semaphore>,
    bucket: Arc<TokenBucket>,
}

impl Transport {
    pub fn new(settings: TransportSettings, max_concurrent: usize, rpm_limit: f64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("reqwest client configuration is static and always valid"),
            settings: Arc::new(settings),
            gate: Arc::new(Semaphore::new(max_concurrent)),
            bucket: Arc::new(TokenBucket::new(rpm_limit)),
        }
    }

    /// Send one chat-completion request. Returns `None` when the model
    /// refused to answer, or answered with an empty, content-filtered
    /// response — both are treated as "no usable text" rather than errors.
    pub async fn call(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<Option<String>, TranslateError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| TranslateError::TransportError(e.to_string()))?;
        self.bucket.acquire().await;

        let body = ChatRequest {
            model: &self.settings.model,
            messages,
            temperature,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        for attempt in 0..self.settings.max_retries {
            let mut request = self.client.post(&self.settings.api_url).json(&body);
            if !self.settings.api_key.is_empty() {
                request = request.bearer_auth(&self.settings.api_key);
            }
            let result = request.send().await;

            match result {
                Ok(response) if response.status().as_u16() == 429 => {
                    warn!("rate limited by upstream, backing off 5s");
                    sleep(Duration::from_secs(5)).await;
                    continue;
                }
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        warn!(%status, attempt, "non-success response");
                        if attempt + 1 < self.settings.max_retries {
                            sleep(self.settings.retry_delay).await;
                        }
                        continue;
                    }
                    match response.json::<ChatResponse>().await {
                        Ok(parsed) => return Ok(extract_text(parsed)),
                        Err(e) => {
                            warn!(error = %e, attempt, "non-JSON body");
                            if attempt + 1 < self.settings.max_retries {
                                sleep(self.settings.retry_delay).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "request failed");
                    if attempt + 1 < self.settings.max_retries {
                        sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        warn!(max_retries = self.settings.max_retries, "exhausted retries, giving up");
        Ok(None)
    }
}

fn extract_text(parsed: ChatResponse) -> Option<String> {
    let choice = parsed.choices.into_iter().next()?;
    if choice.message.refusal.is_some() {
        debug!("model issued a refusal");
        return None;
    }
    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        if choice.finish_reason.as_deref() == Some("content_filter") {
            warn!("response withheld by content filter");
        }
        return None;
    }
    Some(content.trim().to_string())
}
