use std::sync::Arc;

use core_types::normalize::{normalize_create, normalize_update};
use core_types::{
    CompletionClient, CreateNoteRequest, NoteDraft, NoteError, NoteId, NoteRecord,
    NoteRepository, NoteResult, NoteTranslation, UpdateNoteRequest,
};
use tracing::{debug, info};

mod generation;
mod translation;

#[cfg(test)]
mod test_support;

pub use generation::{NoteGenerationPipeline, parse_draft};
pub use translation::TranslationAdapter;

/// Entry point for every note operation the transport exposes.
pub struct NoteService {
    repository: Arc<dyn NoteRepository>,
    generator: NoteGenerationPipeline,
    translator: TranslationAdapter,
}

impl NoteService {
    pub fn new(repository: Arc<dyn NoteRepository>, completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            repository,
            generator: NoteGenerationPipeline::new(completion.clone()),
            translator: TranslationAdapter::new(completion),
        }
    }

    pub async fn create_from_fields(&self, request: CreateNoteRequest) -> NoteResult<NoteRecord> {
        let note = normalize_create(request)?;
        let record = self.repository.create(note).await?;
        info!(note_id = record.id, "note created");
        Ok(record)
    }

    /// Produces a draft only. Committing it is a separate
    /// [`NoteService::create_from_fields`] call.
    pub async fn create_from_generation(&self, input_text: &str) -> NoteResult<NoteDraft> {
        if input_text.trim().is_empty() {
            return Err(NoteError::invalid("input_text is required"));
        }
        self.generator.generate(input_text).await
    }

    pub async fn get(&self, id: NoteId) -> NoteResult<NoteRecord> {
        self.repository.get(id).await
    }

    pub async fn list_all(&self) -> NoteResult<Vec<NoteRecord>> {
        self.repository.list_all().await
    }

    pub async fn search(&self, query: &str) -> NoteResult<Vec<NoteRecord>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.repository.search(query).await
    }

    pub async fn count(&self) -> NoteResult<u64> {
        self.repository.count().await
    }

    /// Applies only the keys present in `request`. A request with no
    /// recognized keys writes nothing and leaves `updated_at` as it was.
    pub async fn update_partial(
        &self,
        id: NoteId,
        request: UpdateNoteRequest,
    ) -> NoteResult<NoteRecord> {
        let patch = normalize_update(request)?;
        if patch.is_empty() {
            debug!(note_id = id, "empty update, nothing to write");
            return self.repository.get(id).await;
        }

        let record = self.repository.update(id, patch).await?;
        info!(note_id = id, "note updated");
        Ok(record)
    }

    pub async fn remove(&self, id: NoteId) -> NoteResult<()> {
        self.repository.delete(id).await?;
        info!(note_id = id, "note deleted");
        Ok(())
    }

    pub async fn translate(
        &self,
        id: NoteId,
        target_language: &str,
    ) -> NoteResult<NoteTranslation> {
        let note = self.repository.get(id).await?;
        if target_language.trim().is_empty() {
            return Err(NoteError::invalid("target_language required"));
        }

        let translated_title = self.translator.translate(&note.title, target_language).await?;
        let translated_content = self
            .translator
            .translate(&note.content, target_language)
            .await?;

        Ok(NoteTranslation {
            note_id: note.id,
            target_language: target_language.to_string(),
            translated_title,
            translated_content,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use core_types::TagsInput;
    use storage_sqlite::SqliteStorage;

    use super::*;
    use crate::test_support::ScriptedClient;

    async fn service_with(
        responses: impl IntoIterator<Item = Result<String, String>>,
    ) -> (NoteService, Arc<ScriptedClient>) {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let client = Arc::new(ScriptedClient::new(responses));
        let service = NoteService::new(Arc::new(storage), client.clone());
        (service, client)
    }

    fn fields(title: &str, content: &str) -> CreateNoteRequest {
        CreateNoteRequest {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            ..CreateNoteRequest::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (service, _) = service_with([]).await;
        let created = service
            .create_from_fields(fields("Groceries", "milk, eggs"))
            .await
            .expect("create");
        let fetched = service.get(created.id).await.expect("get");
        assert_eq!(fetched.title, "Groceries");
        assert_eq!(fetched.content, "milk, eggs");
        assert_eq!(fetched.created_at, fetched.updated_at);
        assert_eq!(service.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn create_without_content_is_rejected_before_storage() {
        let (service, _) = service_with([]).await;
        let err = service
            .create_from_fields(CreateNoteRequest {
                title: Some("t".into()),
                ..CreateNoteRequest::default()
            })
            .await
            .expect_err("rejected");
        assert!(matches!(err, NoteError::InvalidInput(_)));
        assert_eq!(service.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn partial_update_changes_only_given_fields() {
        let (service, _) = service_with([]).await;
        let created = service
            .create_from_fields(CreateNoteRequest {
                tags: Some(TagsInput::List(vec!["a".into(), "b".into()])),
                event_date: Some("2024-02-01".into()),
                ..fields("old", "body")
            })
            .await
            .expect("create");

        let updated = service
            .update_partial(
                created.id,
                UpdateNoteRequest {
                    title: Some("X".into()),
                    ..UpdateNoteRequest::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.title, "X");
        assert_eq!(updated.content, "body");
        assert_eq!(updated.tags, vec!["a", "b"]);
        assert_eq!(updated.event_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn empty_update_is_a_no_op() {
        let (service, _) = service_with([]).await;
        let created = service
            .create_from_fields(fields("t", "c"))
            .await
            .expect("create");
        let unchanged = service
            .update_partial(created.id, UpdateNoteRequest::default())
            .await
            .expect("update");
        assert_eq!(unchanged, created);
    }

    #[tokio::test]
    async fn empty_update_on_missing_note_is_not_found() {
        let (service, _) = service_with([]).await;
        let err = service
            .update_partial(99, UpdateNoteRequest::default())
            .await
            .expect_err("missing");
        assert!(matches!(err, NoteError::NotFound(99)));
    }

    #[tokio::test]
    async fn meeting_event_time_can_be_cleared() {
        let (service, _) = service_with([]).await;
        let created = service
            .create_from_fields(CreateNoteRequest {
                event_date: Some("2025-03-10".into()),
                event_time: Some("14:30".into()),
                ..fields("Meeting", "Discuss Q3")
            })
            .await
            .expect("create");
        let fetched = service.get(created.id).await.expect("get");
        assert_eq!(fetched.event_date, NaiveDate::from_ymd_opt(2025, 3, 10));
        assert_eq!(fetched.event_time, NaiveTime::from_hms_opt(14, 30, 0));

        service
            .update_partial(
                created.id,
                UpdateNoteRequest {
                    event_time: Some(Some(String::new())),
                    ..UpdateNoteRequest::default()
                },
            )
            .await
            .expect("update");

        let fetched = service.get(created.id).await.expect("get");
        assert_eq!(fetched.event_time, None);
        assert_eq!(fetched.event_date, NaiveDate::from_ymd_opt(2025, 3, 10));
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found() {
        let (service, _) = service_with([]).await;
        let created = service
            .create_from_fields(fields("t", "c"))
            .await
            .expect("create");
        service.remove(created.id).await.expect("delete");
        assert!(matches!(
            service.get(created.id).await,
            Err(NoteError::NotFound(_))
        ));
        assert!(matches!(
            service.remove(created.id).await,
            Err(NoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_contract() {
        let (service, _) = service_with([]).await;
        let note = service
            .create_from_fields(fields("Quarterly plan", "Discuss Q3 targets"))
            .await
            .expect("create");

        assert!(service.search("").await.expect("search").is_empty());
        let hits = service.search("Q3").await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, note.id);
        assert!(service.search("zebra").await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn generation_does_not_persist() {
        let (service, client) = service_with([Ok(
            r#"{"title":"Dentist","content":"Dentist at 3pm","tags":["health"],"event_time":"15:00"}"#
                .to_string(),
        )])
        .await;

        let draft = service
            .create_from_generation("dentist tomorrow 3pm")
            .await
            .expect("draft");
        assert_eq!(draft.title, "Dentist");
        assert_eq!(draft.event_time, NaiveTime::from_hms_opt(15, 0, 0));
        assert_eq!(service.count().await.expect("count"), 0);
        assert_eq!(client.requests().len(), 1);

        let committed = service
            .create_from_fields(draft.into_create_request())
            .await
            .expect("commit draft");
        assert_eq!(committed.tags, vec!["health"]);
        assert_eq!(committed.event_time, NaiveTime::from_hms_opt(15, 0, 0));
    }

    #[tokio::test]
    async fn blank_generation_input_skips_the_model() {
        let (service, client) = service_with([]).await;
        let err = service
            .create_from_generation("   ")
            .await
            .expect_err("rejected");
        assert!(matches!(err, NoteError::InvalidInput(_)));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn malformed_generation_is_reported() {
        let (service, _) = service_with([Ok("not json".to_string())]).await;
        let err = service
            .create_from_generation("something")
            .await
            .expect_err("malformed");
        assert!(matches!(err, NoteError::MalformedGeneration(_)));
        assert!(err.is_server_fault());
    }

    #[tokio::test]
    async fn translate_returns_both_fields_without_mutation() {
        let (service, client) =
            service_with([Ok("Réunion".to_string()), Ok("Discuter du T3".to_string())]).await;
        let created = service
            .create_from_fields(fields("Meeting", "Discuss Q3"))
            .await
            .expect("create");

        let translation = service
            .translate(created.id, "French")
            .await
            .expect("translate");
        assert_eq!(translation.note_id, created.id);
        assert_eq!(translation.target_language, "French");
        assert_eq!(translation.translated_title, "Réunion");
        assert_eq!(translation.translated_content, "Discuter du T3");
        assert_eq!(client.requests().len(), 2);

        assert_eq!(service.get(created.id).await.expect("get"), created);
    }

    #[tokio::test]
    async fn translate_fails_whole_when_content_fails() {
        let (service, _) =
            service_with([Ok("Réunion".to_string()), Err("rate limited".to_string())]).await;
        let created = service
            .create_from_fields(fields("Meeting", "Discuss Q3"))
            .await
            .expect("create");
        let err = service
            .translate(created.id, "French")
            .await
            .expect_err("failed");
        assert!(matches!(err, NoteError::Translation(_)));
    }

    #[tokio::test]
    async fn translate_checks_note_then_language() {
        let (service, client) = service_with([]).await;
        assert!(matches!(
            service.translate(5, "French").await,
            Err(NoteError::NotFound(5))
        ));

        let created = service
            .create_from_fields(fields("t", "c"))
            .await
            .expect("create");
        assert!(matches!(
            service.translate(created.id, " ").await,
            Err(NoteError::InvalidInput(_))
        ));
        assert!(client.requests().is_empty());
    }
}
