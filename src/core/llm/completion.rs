use crate::error::Result;

/// A text-completion service: one prompt in, one response text out
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send `prompt` and return the raw response text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the provider name (e.g., "OpenAI-compatible")
    fn provider_name(&self) -> &str;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}
