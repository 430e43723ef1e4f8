//! Durable error-pattern storage. Mirrors the teacher's `SQLiteCheckpointer`:
//! one table, JSON-encoded set columns, migrations run on connect.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::backend::{ErrorStoreBackend, ErrorStoreError, Result};
use super::types::ErrorPattern;

pub struct SqliteErrorStoreBackend {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteErrorStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteErrorStoreBackend").finish()
    }
}

impl SqliteErrorStoreBackend {
    /// Connect (or create) a SQLite database at `database_url` and ensure
    /// the `error_patterns` table exists.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| ErrorStoreError::Backend {
                message: format!("connect error: {e}"),
            })?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS error_patterns (
                fingerprint TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                category TEXT NOT NULL,
                text TEXT NOT NULL,
                problem TEXT NOT NULL,
                severity TEXT NOT NULL,
                estimated_impact REAL NOT NULL,
                frequency INTEGER NOT NULL,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                dismissed INTEGER NOT NULL,
                projects_json TEXT NOT NULL,
                sessions_seen_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| ErrorStoreError::Backend {
            message: format!("create table: {e}"),
        })?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn severity_to_str(severity: crate::scorer::IssueSeverity) -> &'static str {
    match severity {
        crate::scorer::IssueSeverity::Low => "low",
        crate::scorer::IssueSeverity::Medium => "medium",
        crate::scorer::IssueSeverity::High => "high",
    }
}

fn severity_from_str(s: &str) -> crate::scorer::IssueSeverity {
    match s {
        "high" => crate::scorer::IssueSeverity::High,
        "medium" => crate::scorer::IssueSeverity::Medium,
        _ => crate::scorer::IssueSeverity::Low,
    }
}

fn row_to_pattern(row: &sqlx::sqlite::SqliteRow) -> Result<ErrorPattern> {
    let projects_json: String = row.get("projects_json");
    let sessions_json: String = row.get("sessions_seen_json");
    let projects: BTreeSet<String> =
        serde_json::from_str(&projects_json).map_err(|e| ErrorStoreError::Backend {
            message: format!("projects decode: {e}"),
        })?;
    let sessions_seen: BTreeSet<String> =
        serde_json::from_str(&sessions_json).map_err(|e| ErrorStoreError::Backend {
            message: format!("sessions decode: {e}"),
        })?;
    let first_seen_at: String = row.get("first_seen_at");
    let last_seen_at: String = row.get("last_seen_at");
    Ok(ErrorPattern {
        id: row.get("id"),
        fingerprint: row.get("fingerprint"),
        category: row.get("category"),
        text: row.get("text"),
        problem: row.get("problem"),
        severity: severity_from_str(&row.get::<String, _>("severity")),
        estimated_impact: row.get("estimated_impact"),
        frequency: row.get::<i64, _>("frequency") as u32,
        first_seen_at: DateTime::parse_from_rfc3339(&first_seen_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_seen_at: DateTime::parse_from_rfc3339(&last_seen_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        dismissed: row.get::<i64, _>("dismissed") != 0,
        projects,
        sessions_seen,
    })
}

#[async_trait]
impl ErrorStoreBackend for SqliteErrorStoreBackend {
    #[instrument(skip(self, pattern), err)]
    async fn upsert(&self, pattern: ErrorPattern) -> Result<()> {
        let projects_json =
            serde_json::to_string(&pattern.projects).map_err(|e| ErrorStoreError::Backend {
                message: format!("projects encode: {e}"),
            })?;
        let sessions_json = serde_json::to_string(&pattern.sessions_seen).map_err(|e| {
            ErrorStoreError::Backend {
                message: format!("sessions encode: {e}"),
            }
        })?;
        sqlx::query(
            r#"
            INSERT INTO error_patterns (
                fingerprint, id, category, text, problem, severity, estimated_impact,
                frequency, first_seen_at, last_seen_at, dismissed, projects_json, sessions_seen_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(fingerprint) DO UPDATE SET
                id = excluded.id,
                category = excluded.category,
                text = excluded.text,
                problem = excluded.problem,
                severity = excluded.severity,
                estimated_impact = excluded.estimated_impact,
                frequency = excluded.frequency,
                last_seen_at = excluded.last_seen_at,
                dismissed = excluded.dismissed,
                projects_json = excluded.projects_json,
                sessions_seen_json = excluded.sessions_seen_json
            "#,
        )
        .bind(&pattern.fingerprint)
        .bind(&pattern.id)
        .bind(&pattern.category)
        .bind(&pattern.text)
        .bind(&pattern.problem)
        .bind(severity_to_str(pattern.severity))
        .bind(pattern.estimated_impact)
        .bind(i64::from(pattern.frequency))
        .bind(pattern.first_seen_at.to_rfc3339())
        .bind(pattern.last_seen_at.to_rfc3339())
        .bind(i64::from(pattern.dismissed))
        .bind(&projects_json)
        .bind(&sessions_json)
        .execute(&*self.pool)
        .await
        .map_err(|e| ErrorStoreError::Backend {
            message: format!("upsert: {e}"),
        })?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get(&self, fingerprint: &str) -> Result<Option<ErrorPattern>> {
        let row = sqlx::query("SELECT * FROM error_patterns WHERE fingerprint = ?1")
            .bind(fingerprint)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| ErrorStoreError::Backend {
                message: format!("get: {e}"),
            })?;
        row.as_ref().map(row_to_pattern).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_all(&self) -> Result<Vec<ErrorPattern>> {
        let rows = sqlx::query("SELECT * FROM error_patterns")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| ErrorStoreError::Backend {
                message: format!("list_all: {e}"),
            })?;
        rows.iter().map(row_to_pattern).collect()
    }

    #[instrument(skip(self), err)]
    async fn remove(&self, fingerprint: &str) -> Result<()> {
        sqlx::query("DELETE FROM error_patterns WHERE fingerprint = ?1")
            .bind(fingerprint)
            .execute(&*self.pool)
            .await
            .map_err(|e| ErrorStoreError::Backend {
                message: format!("remove: {e}"),
            })?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM error_patterns")
            .execute(&*self.pool)
            .await
            .map_err(|e| ErrorStoreError::Backend {
                message: format!("clear_all: {e}"),
            })?;
        Ok(())
    }
}
