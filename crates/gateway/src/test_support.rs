//! Test doubles for the gateway.

use std::sync::Mutex;
use switchboard_core::error::ProviderError;
use switchboard_core::message::Message;
use switchboard_core::provider::{Provider, ProviderRequest, ProviderResponse};

/// Answers with scripted messages in order, recording every request.
/// Fails once the script runs out.
pub struct ScriptedProvider {
    script: Mutex<Vec<Message>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Message>) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(ProviderError::Network("script exhausted".into()));
        }
        Ok(ProviderResponse {
            message: script.remove(0),
            usage: None,
            model,
        })
    }
}
