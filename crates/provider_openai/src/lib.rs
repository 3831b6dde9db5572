use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use core_types::{CompletionClient, CompletionRequest, ProviderConfig};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    provider: ProviderConfig,
    api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn new(provider: ProviderConfig, api_key: impl Into<String>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = provider.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().context("failed to build http client")?;

        Ok(Self {
            http,
            provider,
            api_key: api_key.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.provider.default_model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.provider.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut headers = HeaderMap::new();
        apply_extra_headers(&mut headers, &self.provider.extra_headers)?;

        let payload = build_chat_request(&self.provider.default_model, request);
        debug!(model = %payload.model, temperature = payload.temperature, "requesting completion");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.trim())
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .context("failed to request provider")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("provider request failed: {status} {text}");
        }

        let output: OpenAiChatResponse = response
            .json()
            .await
            .context("invalid provider response json")?;

        let content = first_choice_content(output)?;
        if content.is_empty() {
            warn!(model = %self.provider.default_model, "empty completion content");
        }
        Ok(content)
    }
}

fn build_chat_request(model: &str, request: &CompletionRequest) -> OpenAiChatRequest {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.trim().is_empty() {
        messages.push(OpenAiMessage {
            role: "system".to_owned(),
            content: request.system_prompt.clone(),
        });
    }
    messages.push(OpenAiMessage {
        role: "user".to_owned(),
        content: request.user_prompt.clone(),
    });

    OpenAiChatRequest {
        model: model.to_owned(),
        messages,
        stream: false,
        temperature: request.temperature,
        top_p: request.top_p,
    }
}

fn first_choice_content(output: OpenAiChatResponse) -> Result<String> {
    let choice = output
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("provider returned no choices"))?;
    Ok(choice.message.content.unwrap_or_default())
}

fn apply_extra_headers(headers: &mut HeaderMap, extra_headers: &[(String, String)]) -> Result<()> {
    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| anyhow!("invalid header name: {key}"))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| anyhow!("invalid header value for {key}"))?;
        headers.insert(name, value);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiAssistantMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiAssistantMessage {
    content: Option<String>,
}
