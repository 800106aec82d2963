//! Task repository: the durable work queue shared by both phases.
//!
//! Sole source of truth for harvest progress and processing state. Every
//! operation is a short-lived single-statement transaction; nothing here
//! holds a connection across a network wait.

use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{debug, warn};

use super::pool::{DieselError, SqlitePool};
use super::parse_datetime_opt;
use crate::models::{Task, TaskStatus};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::schema::search_results;

/// Task row as stored.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::search_results)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct TaskRecord {
    link: String,
    status: i32,
    keyword: Option<String>,
    created_at: Option<String>,
    content: Option<String>,
    retry_count: i32,
    error_log: Option<String>,
    updated_at: Option<String>,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        Task {
            link: record.link,
            status: TaskStatus::from_code(record.status).unwrap_or(TaskStatus::Pending),
            keyword: record.keyword,
            content: record.content,
            retry_count: record.retry_count.max(0) as u32,
            error_log: record.error_log,
            created_at: parse_datetime_opt(record.created_at),
            updated_at: parse_datetime_opt(record.updated_at),
        }
    }
}

/// New task for insertion; always starts pending.
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::search_results)]
struct NewTask<'a> {
    link: &'a str,
    status: i32,
    keyword: &'a str,
    created_at: &'a str,
}

const CREATE_TABLE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS search_results (
    link TEXT PRIMARY KEY,
    status INTEGER NOT NULL DEFAULT 0,
    keyword TEXT,
    created_at TEXT,
    content TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_log TEXT,
    updated_at TEXT
)";

/// Columns added after the first released schema. Databases created by
/// older runs are migrated forward in place, without a migrations table.
const ENSURED_COLUMNS: &[(&str, &str)] = &[
    ("content", "TEXT"),
    ("retry_count", "INTEGER NOT NULL DEFAULT 0"),
    ("error_log", "TEXT"),
    ("updated_at", "TEXT"),
];

/// Repository for the `search_results` work queue.
#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensure the schema exists, migrating older databases forward.
    ///
    /// Safe to call on every startup: the table create is conditional and
    /// column adds are skipped when already present. A failed column add is
    /// logged and swallowed so a hand-edited database with a conflicting
    /// column does not brick startup; genuine storage errors propagate.
    pub async fn initialize(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::sql_query(CREATE_TABLE_SQL).execute(&mut conn).await?;

        #[derive(QueryableByName)]
        struct ColumnRow {
            #[diesel(sql_type = diesel::sql_types::Text)]
            name: String,
        }

        let present: Vec<ColumnRow> =
            diesel::sql_query("SELECT name FROM pragma_table_info('search_results')")
                .load(&mut conn)
                .await?;
        let present: Vec<String> = present
            .into_iter()
            .map(|c| c.name.to_ascii_lowercase())
            .collect();

        for (column, definition) in ENSURED_COLUMNS {
            if present.iter().any(|name| name == column) {
                continue;
            }
            let alter = format!("ALTER TABLE search_results ADD COLUMN {column} {definition}");
            match diesel::sql_query(alter).execute(&mut conn).await {
                Ok(_) => debug!(column, "added missing column"),
                Err(e) => warn!(column, error = %e, "could not add column; leaving schema as-is"),
            }
        }

        Ok(())
    }

    /// Count all tasks discovered under `keyword`, regardless of status.
    ///
    /// This is the harvesting progress signal: already-processed links still
    /// count toward the target.
    pub async fn count_by_keyword(&self, keyword: &str) -> Result<u64, DieselError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;
        let count: i64 = search_results::table
            .filter(search_results::keyword.eq(keyword))
            .select(count_star())
            .first(&mut conn)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Insert links as pending tasks, silently skipping ones already known.
    ///
    /// Returns the number of rows actually added, computed as the keyword
    /// count delta rather than the input length: the same batch may carry
    /// links ingested by a previous run.
    pub async fn insert_links(&self, links: &[String], keyword: &str) -> Result<u64, DieselError> {
        if links.is_empty() {
            return Ok(0);
        }

        let before = self.count_by_keyword(keyword).await?;

        let now = Utc::now().to_rfc3339();
        let rows: Vec<NewTask> = links
            .iter()
            .map(|link| NewTask {
                link,
                status: TaskStatus::Pending.code(),
                keyword,
                created_at: &now,
            })
            .collect();

        let mut conn = self.pool.get().await?;
        // Diesel cannot express a dynamic-length batch insert as one SQLite
        // statement through the async wrapper, so each row is its own
        // single-statement INSERT OR IGNORE.
        for row in &rows {
            diesel::insert_or_ignore_into(search_results::table)
                .values(row)
                .execute(&mut conn)
                .await?;
        }

        let after = self.count_by_keyword(keyword).await?;
        Ok(after.saturating_sub(before))
    }

    /// One pending link, or `None` once the queue is drained.
    ///
    /// Selection order is unspecified. A single processor instance is the
    /// operating assumption; concurrent claimers against the same database
    /// are unsupported (see DESIGN.md).
    pub async fn claim_pending_task(&self) -> Result<Option<String>, DieselError> {
        let mut conn = self.pool.get().await?;
        search_results::table
            .filter(search_results::status.eq(TaskStatus::Pending.code()))
            .select(search_results::link)
            .first::<String>(&mut conn)
            .await
            .optional()
    }

    /// Record a successful extraction.
    ///
    /// Returns `NotFound` if the link was never ingested; recording success
    /// for an unknown task is a logic error upstream.
    pub async fn mark_success(&self, link: &str, content: &str) -> Result<(), DieselError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(search_results::table.find(link))
            .set((
                search_results::status.eq(TaskStatus::Success.code()),
                search_results::content.eq(content),
                search_results::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(DieselError::NotFound);
        }
        Ok(())
    }

    /// Record a failed attempt: bump the retry count and apply `policy` to
    /// decide between another round of pending and permanent failure.
    pub async fn mark_failure(
        &self,
        link: &str,
        error: &str,
        policy: RetryPolicy,
    ) -> Result<RetryDecision, DieselError> {
        let mut conn = self.pool.get().await?;

        let prior: Option<i32> = search_results::table
            .find(link)
            .select(search_results::retry_count)
            .first(&mut conn)
            .await
            .optional()?;

        let decision = policy.after_failure(prior.unwrap_or(0).max(0) as u32);
        let now = Utc::now().to_rfc3339();

        diesel::update(search_results::table.find(link))
            .set((
                search_results::status.eq(decision.status.code()),
                search_results::retry_count.eq(decision.retry_count as i32),
                search_results::error_log.eq(error),
                search_results::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(decision)
    }

    /// Aggregate task counts grouped by status.
    pub async fn stats_by_status(&self) -> Result<HashMap<TaskStatus, u64>, DieselError> {
        #[derive(QueryableByName)]
        struct StatusCount {
            #[diesel(sql_type = diesel::sql_types::Integer)]
            status: i32,
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        let mut conn = self.pool.get().await?;
        let rows: Vec<StatusCount> = diesel::sql_query(
            "SELECT status, COUNT(*) AS count FROM search_results GROUP BY status",
        )
        .load(&mut conn)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                TaskStatus::from_code(row.status).map(|status| (status, row.count.max(0) as u64))
            })
            .collect())
    }

    /// Task totals per keyword, largest first.
    pub async fn counts_by_keyword(&self) -> Result<Vec<(String, u64)>, DieselError> {
        #[derive(QueryableByName)]
        struct KeywordCount {
            #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Text>)]
            keyword: Option<String>,
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        let mut conn = self.pool.get().await?;
        let rows: Vec<KeywordCount> = diesel::sql_query(
            "SELECT keyword, COUNT(*) AS count FROM search_results \
             GROUP BY keyword ORDER BY count DESC",
        )
        .load(&mut conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.keyword.unwrap_or_else(|| "(none)".to_string()),
                    row.count.max(0) as u64,
                )
            })
            .collect())
    }

    /// Fetch one task with its full stored state.
    pub async fn get_task(&self, link: &str) -> Result<Option<Task>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<TaskRecord> = search_results::table
            .find(link)
            .select(TaskRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Task::from))
    }
}
