use std::sync::Arc;

use core_types::normalize::{TAG_DELIMITER, parse_event_date, parse_event_time};
use core_types::{CompletionClient, CompletionRequest, NoteDraft, NoteError, NoteResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const GENERATION_TEMPERATURE: f32 = 0.7;
const GENERATION_TOP_P: f32 = 1.0;

const GENERATION_SYSTEM_PROMPT: &str = "\
You are a helpful assistant that generates well-structured notes and extracts date/time information.
When you find dates or times in the input, format them according to these rules:
- Dates must be in YYYY-MM-DD format
- Times must be in HH:MM 24-hour format
- If multiple dates/times are found, use the most prominent one
- Only extract dates/times that are explicitly written in the input; never assume today's date or invent a time";

/// Turns free text into a [`NoteDraft`] with one model call.
///
/// A response that is not a JSON object is rejected outright. Once the
/// response parses, missing or oddly typed fields fall back to defaults
/// instead of failing.
pub struct NoteGenerationPipeline {
    client: Arc<dyn CompletionClient>,
}

impl NoteGenerationPipeline {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn generate(&self, input_text: &str) -> NoteResult<NoteDraft> {
        let request = CompletionRequest {
            system_prompt: GENERATION_SYSTEM_PROMPT.to_string(),
            user_prompt: build_generation_prompt(input_text),
            temperature: GENERATION_TEMPERATURE,
            top_p: GENERATION_TOP_P,
        };

        let raw = self
            .client
            .complete(&request)
            .await
            .map_err(NoteError::Completion)?;
        debug!(response_len = raw.len(), "generation response received");

        parse_draft(&raw).inspect_err(|err| warn!("rejecting generation response: {err}"))
    }
}

fn build_generation_prompt(input_text: &str) -> String {
    format!(
        "Please create a note from this text and extract any date/time information: {input_text}
Return only a single JSON object with these fields:
- title: The note title
- content: The note content
- tags: Array of exactly 3 relevant tags
- event_date: Date in YYYY-MM-DD format if found, or null
- event_time: Time in HH:MM format if found, or null"
    )
}

pub fn parse_draft(raw: &str) -> NoteResult<NoteDraft> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| NoteError::MalformedGeneration(err.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(NoteError::MalformedGeneration(
            "expected a JSON object".to_string(),
        ));
    };

    Ok(NoteDraft {
        title: text_field(&fields, "title"),
        content: text_field(&fields, "content"),
        tags: tags_field(&fields),
        event_date: fields
            .get("event_date")
            .and_then(Value::as_str)
            .and_then(parse_event_date),
        event_time: fields
            .get("event_time")
            .and_then(Value::as_str)
            .and_then(parse_event_time),
    })
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

fn tags_field(fields: &Map<String, Value>) -> Vec<String> {
    match fields.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(clean_tag)
            .collect(),
        Some(Value::String(text)) => text.split(TAG_DELIMITER).filter_map(clean_tag).collect(),
        _ => Vec::new(),
    }
}

// A tag must survive the comma-joined storage form as a single entry.
fn clean_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().replace(TAG_DELIMITER, " ");
    (!tag.is_empty()).then_some(tag)
}
