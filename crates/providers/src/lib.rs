//! Completion provider implementations for Switchboard.
//!
//! All providers implement the `switchboard_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use std::time::Duration;

use switchboard_core::Provider;
use switchboard_core::error::ProviderError;

/// Build the completion provider described by the configuration.
pub fn build_from_config(
    config: &switchboard_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!(api_url = %config.api_url, "No API key configured; requests will be unauthenticated");
    }
    let provider = OpenAiCompatProvider::new("openai", &config.api_url, api_key)?
        .with_timeout(Duration::from_secs(config.request_timeout_secs))?;
    Ok(Arc::new(provider))
}
