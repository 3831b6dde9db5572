use std::sync::Arc;

use core_types::{CompletionClient, CompletionRequest, NoteError, NoteResult};
use tracing::debug;

const TRANSLATION_SYSTEM_PROMPT: &str = "You are a helpful assistant that translates text to the target language. \
Reply with the translated text only, without any other commentary.";

/// Stateless per-field translation. No retries, nothing cached.
pub struct TranslationAdapter {
    client: Arc<dyn CompletionClient>,
}

impl TranslationAdapter {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> NoteResult<String> {
        let request = CompletionRequest {
            system_prompt: TRANSLATION_SYSTEM_PROMPT.to_string(),
            user_prompt: format!("Translate the following text to {target_language}: {text}"),
            temperature: 1.0,
            top_p: 1.0,
        };
        debug!(target_language, chars = text.len(), "translating text");

        self.client
            .complete(&request)
            .await
            .map_err(NoteError::Translation)
    }
}
