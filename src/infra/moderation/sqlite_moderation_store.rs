// SQLite-backed moderation store.
//
// Tables:
// - moderation_rules: Keyword/regex rules (list columns stored as JSON text)
// - moderation_reports: Review queue of non-allow decisions

use crate::core::moderation::{
    ContentType, ModerationError, ModerationReport, ModerationRule, ModerationStore, NewReport,
    ReportStatus, RuleAction, RuleDraft, Severity,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

fn storage_error(e: impl std::fmt::Display) -> ModerationError {
    ModerationError::StorageError(e.to_string())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ModerationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_error(format!("bad timestamp '{}': {}", value, e)))
}

fn parse_json_list<T: DeserializeOwned>(value: &str) -> Result<Vec<T>, ModerationError> {
    serde_json::from_str(value).map_err(storage_error)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ModerationError> {
    serde_json::to_string(value).map_err(storage_error)
}

fn parse_severity(value: &str) -> Result<Severity, ModerationError> {
    Severity::parse(value).ok_or_else(|| storage_error(format!("unknown severity '{}'", value)))
}

fn parse_action(value: &str) -> Result<RuleAction, ModerationError> {
    RuleAction::parse(value).ok_or_else(|| storage_error(format!("unknown action '{}'", value)))
}

fn rule_from_row(row: &SqliteRow) -> Result<ModerationRule, ModerationError> {
    let keywords: String = row.get("keywords");
    let content_types: String = row.get("content_types");
    let exempt_roles: String = row.get("exempt_roles");
    let severity: String = row.get("severity");
    let action: String = row.get("action");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ModerationRule {
        id: row.get("id"),
        name: row.get("name"),
        keywords: parse_json_list(&keywords)?,
        content_types: parse_json_list::<ContentType>(&content_types)?,
        severity: parse_severity(&severity)?,
        action: parse_action(&action)?,
        active: row.get("active"),
        case_sensitive: row.get("case_sensitive"),
        whole_word_only: row.get("whole_word_only"),
        regex: row.get("regex"),
        exempt_roles: parse_json_list(&exempt_roles)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn report_from_row(row: &SqliteRow) -> Result<ModerationReport, ModerationError> {
    let severity: String = row.get("severity");
    let action: String = row.get("action");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let reviewed_at: Option<String> = row.get("reviewed_at");

    Ok(ModerationReport {
        id: row.get("id"),
        content_id: row.get("content_id"),
        content_type: row.get("content_type"),
        author_id: row.get("author_id"),
        rule_id: row.get("rule_id"),
        rule_name: row.get("rule_name"),
        severity: parse_severity(&severity)?,
        action: parse_action(&action)?,
        matched_term: row.get("matched_term"),
        status: ReportStatus::parse(&status)
            .ok_or_else(|| storage_error(format!("unknown report status '{}'", status)))?,
        created_at: parse_timestamp(&created_at)?,
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: reviewed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                keywords TEXT NOT NULL DEFAULT '[]',
                content_types TEXT NOT NULL DEFAULT '[]',
                severity TEXT NOT NULL,
                action TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                case_sensitive BOOLEAN NOT NULL DEFAULT 0,
                whole_word_only BOOLEAN NOT NULL DEFAULT 0,
                regex TEXT,
                exempt_roles TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_moderation_rules_active
                ON moderation_rules(active)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_id TEXT NOT NULL,
                content_type TEXT NOT NULL,
                author_id TEXT,
                rule_id INTEGER NOT NULL,
                rule_name TEXT NOT NULL,
                severity TEXT NOT NULL,
                action TEXT NOT NULL,
                matched_term TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                reviewed_by TEXT,
                reviewed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_moderation_reports_status
                ON moderation_reports(status, id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

#[async_trait]
impl ModerationStore for SqliteModerationStore {
    async fn list_active_rules(&self) -> Result<Vec<ModerationRule>, ModerationError> {
        let rows = sqlx::query("SELECT * FROM moderation_rules WHERE active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn list_rules(&self) -> Result<Vec<ModerationRule>, ModerationError> {
        let rows = sqlx::query("SELECT * FROM moderation_rules ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn get_rule(&self, id: i64) -> Result<Option<ModerationRule>, ModerationError> {
        let row = sqlx::query("SELECT * FROM moderation_rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(rule_from_row).transpose()
    }

    async fn create_rule(
        &self,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<ModerationRule, ModerationError> {
        let now_str = now.to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO moderation_rules (
                name, keywords, content_types, severity, action, active,
                case_sensitive, whole_word_only, regex, exempt_roles,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.name)
        .bind(to_json(&draft.keywords)?)
        .bind(to_json(&draft.content_types)?)
        .bind(draft.severity.as_str())
        .bind(draft.action.as_str())
        .bind(draft.active)
        .bind(draft.case_sensitive)
        .bind(draft.whole_word_only)
        .bind(&draft.regex)
        .bind(to_json(&draft.exempt_roles)?)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        let id = result.last_insert_rowid();
        self.get_rule(id)
            .await?
            .ok_or_else(|| storage_error(format!("rule {} vanished after insert", id)))
    }

    async fn update_rule(
        &self,
        id: i64,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<Option<ModerationRule>, ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE moderation_rules SET
                name = ?,
                keywords = ?,
                content_types = ?,
                severity = ?,
                action = ?,
                active = ?,
                case_sensitive = ?,
                whole_word_only = ?,
                regex = ?,
                exempt_roles = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.name)
        .bind(to_json(&draft.keywords)?)
        .bind(to_json(&draft.content_types)?)
        .bind(draft.severity.as_str())
        .bind(draft.action.as_str())
        .bind(draft.active)
        .bind(draft.case_sensitive)
        .bind(draft.whole_word_only)
        .bind(&draft.regex)
        .bind(to_json(&draft.exempt_roles)?)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_rule(id).await
    }

    async fn set_rule_active(
        &self,
        id: i64,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ModerationRule>, ModerationError> {
        let result =
            sqlx::query("UPDATE moderation_rules SET active = ?, updated_at = ? WHERE id = ?")
                .bind(active)
                .bind(now.to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_rule(id).await
    }

    async fn delete_rule(&self, id: i64) -> Result<bool, ModerationError> {
        let result = sqlx::query("DELETE FROM moderation_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_report(
        &self,
        report: NewReport,
        now: DateTime<Utc>,
    ) -> Result<ModerationReport, ModerationError> {
        let result = sqlx::query(
            r#"
            INSERT INTO moderation_reports (
                content_id, content_type, author_id, rule_id, rule_name,
                severity, action, matched_term, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.content_id)
        .bind(&report.content_type)
        .bind(&report.author_id)
        .bind(report.rule_id)
        .bind(&report.rule_name)
        .bind(report.severity.as_str())
        .bind(report.action.as_str())
        .bind(&report.matched_term)
        .bind(report.status.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(ModerationReport {
            id: result.last_insert_rowid(),
            content_id: report.content_id,
            content_type: report.content_type,
            author_id: report.author_id,
            rule_id: report.rule_id,
            rule_name: report.rule_name,
            severity: report.severity,
            action: report.action,
            matched_term: report.matched_term,
            status: report.status,
            created_at: now,
            reviewed_by: None,
            reviewed_at: None,
        })
    }

    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: u32,
    ) -> Result<Vec<ModerationReport>, ModerationError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM moderation_reports WHERE status = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM moderation_reports ORDER BY id DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage_error)?;

        rows.iter().map(report_from_row).collect()
    }

    async fn review_report(
        &self,
        id: i64,
        status: ReportStatus,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ModerationReport>, ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE moderation_reports
            SET status = ?, reviewed_by = ?, reviewed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(reviewer)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM moderation_reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(report_from_row).transpose()
    }
}
