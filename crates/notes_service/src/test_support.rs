use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use core_types::{CompletionClient, CompletionRequest};

/// Replays canned completions in order and records every request.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: impl IntoIterator<Item = std::result::Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let next = self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response left".to_string()));
        next.map_err(|message| anyhow!(message))
    }
}
