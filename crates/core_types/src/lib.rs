use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod normalize;

pub type NoteId = i64;
pub type NoteResult<T> = std::result::Result<T, NoteError>;

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("note {0} not found")]
    NotFound(NoteId),

    #[error("storage unavailable: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("invalid response format from language model: {0}")]
    MalformedGeneration(String),

    #[error("note generation failed: {0:#}")]
    Completion(#[source] anyhow::Error),

    #[error("translation failed: {0:#}")]
    Translation(#[source] anyhow::Error),
}

impl NoteError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// True for faults on our side of the boundary, as opposed to bad input
    /// or a missing note.
    pub fn is_server_fault(&self) -> bool {
        !matches!(self, Self::InvalidInput(_) | Self::NotFound(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteRecord {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
}

/// A normalized note ready to be inserted. `tags` is the canonical stored
/// form, see [`normalize::normalize_tags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub tags: String,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
}

/// Normalized partial update. `None` leaves a field untouched; for the
/// date/time fields `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<String>,
    pub event_date: Option<Option<NaiveDate>>,
    pub event_time: Option<Option<NaiveTime>>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.event_date.is_none()
            && self.event_time.is_none()
    }

    pub fn apply_to(&self, record: &mut NoteRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(content) = &self.content {
            record.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = normalize::split_stored_tags(tags);
        }
        if let Some(event_date) = self.event_date {
            record.event_date = event_date;
        }
        if let Some(event_time) = self.event_time {
            record.event_time = event_time;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<TagsInput>,
    #[serde(default, deserialize_with = "deserialize_loose_text")]
    pub event_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_loose_text")]
    pub event_time: Option<String>,
}

/// Partial update payload. For `tags`, `event_date` and `event_time` the
/// outer `Option` records whether the key was sent at all, so an explicit
/// `null` can be told apart from an omitted key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub tags: Option<Option<TagsInput>>,
    #[serde(default, deserialize_with = "deserialize_present_loose_text")]
    pub event_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_present_loose_text")]
    pub event_time: Option<Option<String>>,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseText {
    Text(String),
    Other(IgnoredAny),
}

// Event fields accept any JSON value; anything but a string reads as absent.
fn deserialize_loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LooseText>::deserialize(deserializer)? {
        Some(LooseText::Text(text)) => Some(text),
        Some(LooseText::Other(_)) | None => None,
    })
}

fn deserialize_present_loose_text<'de, D>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_loose_text(deserializer).map(Some)
}

/// Candidate note synthesized by the language model. Never persisted as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub event_date: Option<NaiveDate>,
    #[serde(default, with = "hour_minute")]
    pub event_time: Option<NaiveTime>,
}

impl NoteDraft {
    /// Turns the draft into the payload a client would submit to commit it.
    pub fn into_create_request(self) -> CreateNoteRequest {
        CreateNoteRequest {
            title: Some(self.title),
            content: Some(self.content),
            tags: Some(TagsInput::List(self.tags)),
            event_date: self
                .event_date
                .map(|date| date.format(normalize::EVENT_DATE_FORMAT).to_string()),
            event_time: self
                .event_time
                .map(|time| time.format(normalize::EVENT_TIME_FORMAT).to_string()),
        }
    }
}

mod hour_minute {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::normalize::{EVENT_TIME_FORMAT, parse_event_time};

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.format(EVENT_TIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_event_time))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteTranslation {
    pub note_id: NoteId,
    pub target_language: String,
    pub translated_title: String,
    pub translated_content: String,
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn create(&self, note: NewNote) -> NoteResult<NoteRecord>;
    async fn get(&self, id: NoteId) -> NoteResult<NoteRecord>;
    /// Most recently updated first.
    async fn list_all(&self) -> NoteResult<Vec<NoteRecord>>;
    async fn update(&self, id: NoteId, patch: NotePatch) -> NoteResult<NoteRecord>;
    async fn delete(&self, id: NoteId) -> NoteResult<()>;
    /// Case-sensitive substring match on title or content, most recently
    /// updated first. An empty query matches nothing.
    async fn search(&self, query: &str) -> NoteResult<Vec<NoteRecord>>;
    async fn count(&self) -> NoteResult<u64>;
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
}

/// Single-shot text completion against a language model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub default_model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://models.github.ai/inference".to_string(),
            default_model: "openai/gpt-4.1-mini".to_string(),
            api_key_env: "GITHUB_TOKEN".to_string(),
            request_timeout_secs: Some(60),
            extra_headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn update_request_distinguishes_null_from_missing() {
        let request: UpdateNoteRequest =
            serde_json::from_value(json!({"event_date": null, "tags": ["a"]})).expect("parse");
        assert_eq!(request.event_date, Some(None));
        assert_eq!(request.event_time, None);
        assert_eq!(request.tags, Some(Some(TagsInput::List(vec!["a".into()]))));
    }

    #[test]
    fn non_string_event_fields_read_as_absent() {
        let request: CreateNoteRequest = serde_json::from_value(json!({
            "title": "t",
            "content": "c",
            "event_date": 20250310,
            "event_time": {"hour": 14}
        }))
        .expect("parse");
        assert_eq!(request.event_date, None);
        assert_eq!(request.event_time, None);

        let request: UpdateNoteRequest =
            serde_json::from_value(json!({"event_date": 20250310, "event_time": [14, 30]}))
                .expect("parse");
        assert_eq!(request.event_date, Some(None));
        assert_eq!(request.event_time, Some(None));
    }

    #[test]
    fn tags_accept_list_or_string() {
        let request: CreateNoteRequest =
            serde_json::from_value(json!({"title": "t", "content": "c", "tags": "x,y"}))
                .expect("parse");
        assert_eq!(request.tags, Some(TagsInput::Text("x,y".into())));
    }

    #[test]
    fn record_serializes_event_time_with_seconds() {
        let now = Utc::now();
        let record = NoteRecord {
            id: 1,
            title: "Meeting".into(),
            content: "Discuss Q3".into(),
            created_at: now,
            updated_at: now,
            tags: vec![],
            event_date: NaiveDate::from_ymd_opt(2025, 3, 10),
            event_time: NaiveTime::from_hms_opt(14, 30, 0),
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["event_date"], "2025-03-10");
        assert_eq!(value["event_time"], "14:30:00");
    }

    #[test]
    fn draft_serializes_event_time_as_hour_minute() {
        let draft = NoteDraft {
            event_time: NaiveTime::from_hms_opt(9, 5, 0),
            ..NoteDraft::default()
        };
        let value = serde_json::to_value(&draft).expect("serialize");
        assert_eq!(value["event_time"], "09:05");
        assert_eq!(value["event_date"], serde_json::Value::Null);
        assert_eq!(value["tags"], json!([]));
    }

    #[test]
    fn patch_apply_clears_event_date_only() {
        let now = Utc::now();
        let mut record = NoteRecord {
            id: 7,
            title: "a".into(),
            content: "b".into(),
            created_at: now,
            updated_at: now,
            tags: vec!["x".into()],
            event_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            event_time: NaiveTime::from_hms_opt(8, 0, 0),
        };
        let patch = NotePatch {
            event_date: Some(None),
            ..NotePatch::default()
        };
        patch.apply_to(&mut record);
        assert_eq!(record.event_date, None);
        assert_eq!(record.event_time, NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(record.tags, vec!["x".to_string()]);
    }
}
