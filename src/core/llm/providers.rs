use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{CodeweaveError, Result};
use super::completion::CompletionProvider;

/// Factory function to create the completion chain used for `model`.
///
/// The primary model is retried `max_retries` times, then the fallback
/// model (if configured and different) gets the same budget.
pub fn create_provider(config: &LlmConfig, model: &str) -> Result<Arc<dyn CompletionProvider>> {
    if config.base_url.trim().is_empty() {
        return Err(CodeweaveError::Config("llm.base_url must not be empty".to_string()));
    }

    let mut chain: Vec<Box<dyn CompletionProvider>> =
        vec![Box::new(OpenAiCompatibleProvider::new(config, model)?)];

    if let Some(fallback) = config.fallback_model.as_deref().filter(|m| *m != model) {
        chain.push(Box::new(OpenAiCompatibleProvider::new(config, fallback)?));
    }

    Ok(Arc::new(FallbackProvider::new(chain, config.max_retries)))
}

/// Chat-completions client for any OpenAI-compatible endpoint
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CodeweaveError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.resolved_api_key(),
            model: model.to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        });

        let mut request = self.client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CodeweaveError::Oracle(format!("{} request failed: {}", self.model, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CodeweaveError::Oracle(
                format!("{} returned {}: {}", self.model, status, error_text)
            ));
        }

        let response_data: serde_json::Value = response.json().await
            .map_err(|e| CodeweaveError::Oracle(format!("Failed to parse {} response: {}", self.model, e)))?;

        if let Some(usage) = response_data.get("usage") {
            debug!("{} usage: {} total tokens", self.model, usage["total_tokens"]);
        }

        response_data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CodeweaveError::Oracle(
                format!("{} response has no message content", self.model)
            ))
    }

    fn provider_name(&self) -> &str {
        "OpenAI-compatible"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Tries each provider in turn, retrying each one before moving on
pub struct FallbackProvider {
    chain: Vec<Box<dyn CompletionProvider>>,
    max_retries: u32,
    backoff: Duration,
}

impl FallbackProvider {
    pub fn new(chain: Vec<Box<dyn CompletionProvider>>, max_retries: u32) -> Self {
        Self {
            chain,
            max_retries,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl CompletionProvider for FallbackProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut last_error = CodeweaveError::Oracle("no completion providers configured".to_string());

        for provider in &self.chain {
            for attempt in 0..=self.max_retries {
                if attempt > 0 {
                    tokio::time::sleep(self.backoff * attempt).await;
                }

                match provider.complete(prompt).await {
                    Ok(content) => return Ok(content),
                    Err(e) => {
                        warn!(
                            "⚠️ {} attempt {}/{} failed: {}",
                            provider.model_name(),
                            attempt + 1,
                            self.max_retries + 1,
                            e
                        );
                        last_error = e;
                    }
                }
            }
        }

        Err(last_error)
    }

    fn provider_name(&self) -> &str {
        self.chain.first().map(|p| p.provider_name()).unwrap_or("none")
    }

    fn model_name(&self) -> &str {
        self.chain.first().map(|p| p.model_name()).unwrap_or("none")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        name: &'static str,
        failures_before_success: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CompletionProvider for Flaky {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(CodeweaveError::Oracle(format!("{} unavailable", self.name)))
            } else {
                Ok(format!("answer from {}", self.name))
            }
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }

        fn model_name(&self) -> &str {
            self.name
        }
    }

    fn flaky(name: &'static str, failures: usize) -> (Box<dyn CompletionProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Flaky {
            name,
            failures_before_success: failures,
            calls: calls.clone(),
        };
        (Box::new(provider), calls)
    }

    #[tokio::test]
    async fn test_retries_primary_before_succeeding() {
        let (primary, primary_calls) = flaky("primary", 1);
        let provider = FallbackProvider::new(vec![primary], 2).with_backoff(Duration::ZERO);

        assert_eq!(provider.complete("hi").await.unwrap(), "answer from primary");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_falls_back_after_exhausting_retries() {
        let (primary, primary_calls) = flaky("primary", usize::MAX);
        let (fallback, fallback_calls) = flaky("fallback", 0);
        let provider = FallbackProvider::new(vec![primary, fallback], 1).with_backoff(Duration::ZERO);

        assert_eq!(provider.complete("hi").await.unwrap(), "answer from fallback");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.model_name(), "primary");
    }

    #[tokio::test]
    async fn test_returns_last_error_when_everything_fails() {
        let (primary, _) = flaky("primary", usize::MAX);
        let (fallback, _) = flaky("fallback", usize::MAX);
        let provider = FallbackProvider::new(vec![primary, fallback], 0).with_backoff(Duration::ZERO);

        match provider.complete("hi").await {
            Err(CodeweaveError::Oracle(message)) => assert!(message.contains("fallback")),
            other => panic!("expected oracle error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_provider_validates_base_url() {
        let mut config = LlmConfig::default();
        config.base_url = "  ".to_string();
        assert!(matches!(create_provider(&config, "m"), Err(CodeweaveError::Config(_))));

        let config = LlmConfig::default();
        let provider = create_provider(&config, config.cluster_model()).unwrap();
        assert_eq!(provider.model_name(), "claude-sonnet-4");
    }
}
