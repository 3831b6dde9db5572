//! Conversion of loosely typed request input into the canonical stored form.
//!
//! Date and time parsing never fails loudly: text that does not match the
//! expected pattern, or names an impossible date, normalizes to `None`.

use chrono::{NaiveDate, NaiveTime};

use crate::{
    CreateNoteRequest, NewNote, NoteError, NotePatch, NoteResult, TagsInput, UpdateNoteRequest,
};

pub const TAG_DELIMITER: &str = ",";
pub const EVENT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const EVENT_TIME_FORMAT: &str = "%H:%M";

const EVENT_DATE_SHAPE: &str = "dddd-dd-dd";
const EVENT_TIME_SHAPE: &str = "dd:dd";

pub fn normalize_tags(input: Option<&TagsInput>) -> String {
    match input {
        Some(TagsInput::List(tags)) => tags.join(TAG_DELIMITER),
        Some(TagsInput::Text(text)) => text.clone(),
        None => String::new(),
    }
}

pub fn split_stored_tags(stored: &str) -> Vec<String> {
    if stored.is_empty() {
        return Vec::new();
    }
    stored.split(TAG_DELIMITER).map(str::to_owned).collect()
}

pub fn parse_event_date(text: &str) -> Option<NaiveDate> {
    if !matches_shape(text, EVENT_DATE_SHAPE) {
        return None;
    }
    NaiveDate::parse_from_str(text, EVENT_DATE_FORMAT).ok()
}

pub fn parse_event_time(text: &str) -> Option<NaiveTime> {
    if !matches_shape(text, EVENT_TIME_SHAPE) {
        return None;
    }
    NaiveTime::parse_from_str(text, EVENT_TIME_FORMAT).ok()
}

// `d` in the shape stands for one ASCII digit, anything else must match verbatim.
fn matches_shape(text: &str, shape: &str) -> bool {
    text.len() == shape.len()
        && text.bytes().zip(shape.bytes()).all(|(actual, expected)| {
            if expected == b'd' {
                actual.is_ascii_digit()
            } else {
                actual == expected
            }
        })
}

pub fn normalize_create(request: CreateNoteRequest) -> NoteResult<NewNote> {
    let title = require_text("title", request.title)?;
    let content = require_text("content", request.content)?;

    Ok(NewNote {
        title,
        content,
        tags: normalize_tags(request.tags.as_ref()),
        event_date: request.event_date.as_deref().and_then(parse_event_date),
        event_time: request.event_time.as_deref().and_then(parse_event_time),
    })
}

pub fn normalize_update(request: UpdateNoteRequest) -> NoteResult<NotePatch> {
    let title = request
        .title
        .map(|title| require_text("title", Some(title)))
        .transpose()?;
    let content = request
        .content
        .map(|content| require_text("content", Some(content)))
        .transpose()?;

    Ok(NotePatch {
        title,
        content,
        tags: request.tags.map(|tags| normalize_tags(tags.as_ref())),
        event_date: request
            .event_date
            .map(|date| date.as_deref().and_then(parse_event_date)),
        event_time: request
            .event_time
            .map(|time| time.as_deref().and_then(parse_event_time)),
    })
}

fn require_text(field: &str, value: Option<String>) -> NoteResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(NoteError::invalid(format!("{field} is required"))),
    }
}
