use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, SubsecRound, Utc};
use core_types::normalize::{TAG_DELIMITER, split_stored_tags};
use core_types::{NewNote, NoteError, NoteId, NotePatch, NoteRecord, NoteRepository, NoteResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub const CURRENT_DB_SCHEMA_VERSION: u32 = 1;

const STORED_DATE_FORMAT: &str = "%Y-%m-%d";
const STORED_TIME_FORMAT: &str = "%H:%M:%S";

const SELECT_NOTE: &str = r#"
    SELECT id, title, content, created_at, updated_at, tags, event_date, event_time
    FROM notes
"#;

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent dir for {}", path.display()))?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.to_string_lossy()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    #[cfg(test)]
    async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '',
                event_date TEXT,
                event_time TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_notes_updated_at ON notes(updated_at DESC, id DESC)"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO metadata(key, value)
            VALUES ('schema_version', ?1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(CURRENT_DB_SCHEMA_VERSION.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn schema_version(&self) -> Result<u32> {
        let row = sqlx::query("SELECT value FROM metadata WHERE key = 'schema_version'")
            .fetch_one(&self.pool)
            .await?;
        let version = row.get::<String, _>("value").parse::<u32>()?;
        Ok(version)
    }

    async fn insert_note(&self, note: NewNote) -> Result<NoteRecord> {
        let now = now();
        let result = sqlx::query(
            r#"
            INSERT INTO notes(title, content, created_at, updated_at, tags, event_date, event_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&note.title)
        .bind(&note.content)
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .bind(&note.tags)
        .bind(note.event_date.map(format_date))
        .bind(note.event_time.map(format_time))
        .execute(&self.pool)
        .await
        .context("failed to insert note")?;

        let id = result.last_insert_rowid();
        debug!(note_id = id, "note inserted");

        Ok(NoteRecord {
            id,
            title: note.title,
            content: note.content,
            created_at: now,
            updated_at: now,
            tags: split_stored_tags(&note.tags),
            event_date: note.event_date,
            event_time: note.event_time,
        })
    }

    async fn fetch_note(&self, id: NoteId) -> Result<Option<NoteRecord>> {
        let row = sqlx::query(&format!("{SELECT_NOTE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_note_row).transpose()
    }

    async fn fetch_all(&self) -> Result<Vec<NoteRecord>> {
        let rows = sqlx::query(&format!("{SELECT_NOTE} ORDER BY updated_at DESC, id DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_note_row).collect()
    }

    async fn update_note(&self, id: NoteId, patch: &NotePatch) -> Result<Option<NoteRecord>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("{SELECT_NOTE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = map_note_row(row)?;
        patch.apply_to(&mut record);
        record.updated_at = now().max(record.updated_at);

        sqlx::query(
            r#"
            UPDATE notes
            SET title = ?2, content = ?3, tags = ?4, event_date = ?5, event_time = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&record.title)
        .bind(&record.content)
        .bind(record.tags.join(TAG_DELIMITER))
        .bind(record.event_date.map(format_date))
        .bind(record.event_time.map(format_time))
        .bind(format_timestamp(record.updated_at))
        .execute(&mut *tx)
        .await
        .context("failed to update note")?;

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn delete_note(&self, id: NoteId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete note")?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_notes(&self, query: &str) -> Result<Vec<NoteRecord>> {
        // instr() is a case-sensitive, wildcard-free substring test.
        let rows = sqlx::query(&format!(
            "{SELECT_NOTE} WHERE instr(title, ?1) > 0 OR instr(content, ?1) > 0 \
             ORDER BY updated_at DESC, id DESC"
        ))
        .bind(query)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_note_row).collect()
    }

    async fn count_notes(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM notes")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(row.get::<i64, _>("count"))?)
    }
}

#[async_trait]
impl NoteRepository for SqliteStorage {
    async fn create(&self, note: NewNote) -> NoteResult<NoteRecord> {
        self.insert_note(note).await.map_err(NoteError::Storage)
    }

    async fn get(&self, id: NoteId) -> NoteResult<NoteRecord> {
        self.fetch_note(id)
            .await
            .map_err(NoteError::Storage)?
            .ok_or(NoteError::NotFound(id))
    }

    async fn list_all(&self) -> NoteResult<Vec<NoteRecord>> {
        self.fetch_all().await.map_err(NoteError::Storage)
    }

    async fn update(&self, id: NoteId, patch: NotePatch) -> NoteResult<NoteRecord> {
        self.update_note(id, &patch)
            .await
            .map_err(NoteError::Storage)?
            .ok_or(NoteError::NotFound(id))
    }

    async fn delete(&self, id: NoteId) -> NoteResult<()> {
        if self.delete_note(id).await.map_err(NoteError::Storage)? {
            Ok(())
        } else {
            Err(NoteError::NotFound(id))
        }
    }

    async fn search(&self, query: &str) -> NoteResult<Vec<NoteRecord>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.search_notes(query).await.map_err(NoteError::Storage)
    }

    async fn count(&self) -> NoteResult<u64> {
        self.count_notes().await.map_err(NoteError::Storage)
    }
}

fn map_note_row(row: sqlx::sqlite::SqliteRow) -> Result<NoteRecord> {
    let event_date = row
        .get::<Option<String>, _>("event_date")
        .map(|value| NaiveDate::parse_from_str(&value, STORED_DATE_FORMAT))
        .transpose()
        .context("invalid event_date in database")?;
    let event_time = row
        .get::<Option<String>, _>("event_time")
        .map(|value| NaiveTime::parse_from_str(&value, STORED_TIME_FORMAT))
        .transpose()
        .context("invalid event_time in database")?;

    Ok(NoteRecord {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        created_at: parse_rfc3339(row.get::<String, _>("created_at"))?,
        updated_at: parse_rfc3339(row.get::<String, _>("updated_at"))?,
        tags: split_stored_tags(row.get::<String, _>("tags").as_str()),
        event_date,
        event_time,
    })
}

// Truncated to the stored precision so a returned record equals a re-read one.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed-width so that lexical order in SQL matches chronological order.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(value: NaiveDate) -> String {
    value.format(STORED_DATE_FORMAT).to_string()
}

fn format_time(value: NaiveTime) -> String {
    value.format(STORED_TIME_FORMAT).to_string()
}

fn parse_rfc3339(value: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc))
}
