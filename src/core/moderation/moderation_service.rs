// Moderation service - core business logic for content moderation.
//
// This service handles:
// - Evaluating content against the active rule set
// - Queueing non-allow decisions for moderator review
// - Rule administration (with validation)
// - Review decisions on queued reports
//
// NO HTTP or database dependencies here - just pure domain logic.

use super::moderation_models::{
    ContentItem, ModerationReport, ModerationResult, ModerationRule, NewReport, ReportStatus,
    ReviewDecision, RuleDraft,
};
use super::rule_matcher::{build_regex, evaluate, RuleMatcher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Default and maximum page sizes for the review queue.
pub const DEFAULT_REPORT_LIMIT: u32 = 50;
pub const MAX_REPORT_LIMIT: u32 = 200;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid rule: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for persisting moderation rules and the review queue.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// All rules with `active = true`.
    async fn list_active_rules(&self) -> Result<Vec<ModerationRule>, ModerationError>;

    /// Every rule, active or not, ordered by id.
    async fn list_rules(&self) -> Result<Vec<ModerationRule>, ModerationError>;

    async fn get_rule(&self, id: i64) -> Result<Option<ModerationRule>, ModerationError>;

    /// Insert a rule. The store assigns the id.
    async fn create_rule(
        &self,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<ModerationRule, ModerationError>;

    /// Replace a rule's fields. Returns `None` if the id doesn't exist.
    async fn update_rule(
        &self,
        id: i64,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<Option<ModerationRule>, ModerationError>;

    async fn set_rule_active(
        &self,
        id: i64,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ModerationRule>, ModerationError>;

    /// Returns whether a rule was deleted.
    async fn delete_rule(&self, id: i64) -> Result<bool, ModerationError>;

    async fn record_report(
        &self,
        report: NewReport,
        now: DateTime<Utc>,
    ) -> Result<ModerationReport, ModerationError>;

    /// Newest first.
    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: u32,
    ) -> Result<Vec<ModerationReport>, ModerationError>;

    async fn review_report(
        &self,
        id: i64,
        status: ReportStatus,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ModerationReport>, ModerationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Moderation service for evaluating content and managing rules.
pub struct ModerationService<S: ModerationStore> {
    store: S,
    matcher: RuleMatcher,
}

impl<S: ModerationStore> ModerationService<S> {
    /// Create a new moderation service with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            matcher: RuleMatcher::new(),
        }
    }

    /// Moderate a content item against the active rules.
    ///
    /// Non-allow decisions are recorded in the review queue: flagged content
    /// lands as `pending`, blocked or auto-removed content as `removed`.
    pub async fn moderate(&self, content: &ContentItem) -> Result<ModerationResult, ModerationError> {
        let rules = self.store.list_active_rules().await?;
        self.matcher.retain_rules(&rules);
        let result = self.matcher.evaluate(content, &rules);

        let (Some(rule_id), Some(rule_name), Some(severity)) =
            (result.rule_id, result.rule_name.clone(), result.severity)
        else {
            return Ok(result);
        };

        // An explicit `allow` rule short-circuits lower rules but isn't queued
        if result.is_allowed() {
            return Ok(result);
        }

        tracing::info!(
            content_id = %content.id,
            content_type = %content.content_type,
            rule_id,
            action = %result.action,
            severity = %severity,
            "Content matched moderation rule"
        );

        let report = NewReport {
            content_id: content.id.clone(),
            content_type: content.content_type.clone(),
            author_id: content.author_id.clone(),
            rule_id,
            rule_name,
            severity,
            action: result.action,
            matched_term: result.matched_term.clone(),
            status: ReportStatus::for_action(result.action),
        };
        self.store.record_report(report, Utc::now()).await?;

        Ok(result)
    }

    /// Check a rule draft before it reaches the store.
    pub fn validate_draft(draft: &RuleDraft) -> Result<(), ModerationError> {
        if draft.name.trim().is_empty() {
            return Err(ModerationError::Validation("name must not be empty".to_string()));
        }

        let regex = draft.regex.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let has_keyword = draft.keywords.iter().any(|k| !k.trim().is_empty());

        if regex.is_none() && !has_keyword {
            return Err(ModerationError::Validation(
                "at least one keyword or a regex is required".to_string(),
            ));
        }

        if let Some(pattern) = regex {
            build_regex(pattern, draft.case_sensitive)
                .map_err(|e| ModerationError::Validation(format!("invalid regex: {}", e)))?;
        }

        Ok(())
    }

    /// Normalize list fields: trim, drop blanks and duplicates.
    fn normalize_draft(mut draft: RuleDraft) -> RuleDraft {
        draft.name = draft.name.trim().to_string();
        draft.keywords = dedup_trimmed(draft.keywords);
        draft.exempt_roles = dedup_trimmed(draft.exempt_roles);
        let mut content_types = Vec::with_capacity(draft.content_types.len());
        for content_type in draft.content_types {
            if !content_types.contains(&content_type) {
                content_types.push(content_type);
            }
        }
        draft.content_types = content_types;
        draft.regex = draft
            .regex
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        draft
    }

    /// Dry-run an unsaved rule against sample content. Nothing is stored.
    ///
    /// Uses a throwaway matcher so one-off patterns don't land in the cache.
    pub fn preview_draft(
        &self,
        draft: RuleDraft,
        content: &ContentItem,
    ) -> Result<ModerationResult, ModerationError> {
        Self::validate_draft(&draft)?;
        let draft = Self::normalize_draft(draft);
        let now = Utc::now();

        let rule = ModerationRule {
            id: 0,
            name: draft.name,
            keywords: draft.keywords,
            content_types: draft.content_types,
            severity: draft.severity,
            action: draft.action,
            active: true,
            case_sensitive: draft.case_sensitive,
            whole_word_only: draft.whole_word_only,
            regex: draft.regex,
            exempt_roles: draft.exempt_roles,
            created_at: now,
            updated_at: now,
        };

        Ok(evaluate(content, &[rule]))
    }

    pub async fn list_rules(&self) -> Result<Vec<ModerationRule>, ModerationError> {
        self.store.list_rules().await
    }

    pub async fn get_rule(&self, id: i64) -> Result<ModerationRule, ModerationError> {
        self.store
            .get_rule(id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("rule {}", id)))
    }

    pub async fn create_rule(&self, draft: RuleDraft) -> Result<ModerationRule, ModerationError> {
        Self::validate_draft(&draft)?;
        let rule = self
            .store
            .create_rule(Self::normalize_draft(draft), Utc::now())
            .await?;
        tracing::info!(rule_id = rule.id, name = %rule.name, "Moderation rule created");
        Ok(rule)
    }

    pub async fn update_rule(
        &self,
        id: i64,
        draft: RuleDraft,
    ) -> Result<ModerationRule, ModerationError> {
        Self::validate_draft(&draft)?;
        let rule = self
            .store
            .update_rule(id, Self::normalize_draft(draft), Utc::now())
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("rule {}", id)))?;
        tracing::info!(rule_id = rule.id, "Moderation rule updated");
        Ok(rule)
    }

    pub async fn set_rule_active(
        &self,
        id: i64,
        active: bool,
    ) -> Result<ModerationRule, ModerationError> {
        let rule = self
            .store
            .set_rule_active(id, active, Utc::now())
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("rule {}", id)))?;
        tracing::info!(rule_id = rule.id, active, "Moderation rule toggled");
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: i64) -> Result<(), ModerationError> {
        if !self.store.delete_rule(id).await? {
            return Err(ModerationError::NotFound(format!("rule {}", id)));
        }
        tracing::info!(rule_id = id, "Moderation rule deleted");
        Ok(())
    }

    /// List the review queue. Limit defaults to 50 and is capped at 200.
    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<ModerationReport>, ModerationError> {
        let limit = limit
            .unwrap_or(DEFAULT_REPORT_LIMIT)
            .clamp(1, MAX_REPORT_LIMIT);
        self.store.list_reports(status, limit).await
    }

    /// Record a moderator's verdict on a queued report.
    pub async fn review_report(
        &self,
        id: i64,
        decision: ReviewDecision,
        reviewer: &str,
    ) -> Result<ModerationReport, ModerationError> {
        let report = self
            .store
            .review_report(id, decision.status(), reviewer, Utc::now())
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("report {}", id)))?;
        tracing::info!(
            report_id = id,
            reviewer,
            status = report.status.as_str(),
            "Moderation report reviewed"
        );
        Ok(report)
    }
}

fn dedup_trimmed(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{ContentType, RuleAction, Severity};
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// In-memory store for testing
    struct MockModerationStore {
        rules: DashMap<i64, ModerationRule>,
        reports: DashMap<i64, ModerationReport>,
        next_id: AtomicI64,
    }

    impl MockModerationStore {
        fn new() -> Self {
            Self {
                rules: DashMap::new(),
                reports: DashMap::new(),
                next_id: AtomicI64::new(1),
            }
        }

        fn next_id(&self) -> i64 {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn rule_from_draft(id: i64, draft: RuleDraft, now: DateTime<Utc>) -> ModerationRule {
        ModerationRule {
            id,
            name: draft.name,
            keywords: draft.keywords,
            content_types: draft.content_types,
            severity: draft.severity,
            action: draft.action,
            active: draft.active,
            case_sensitive: draft.case_sensitive,
            whole_word_only: draft.whole_word_only,
            regex: draft.regex,
            exempt_roles: draft.exempt_roles,
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl ModerationStore for MockModerationStore {
        async fn list_active_rules(&self) -> Result<Vec<ModerationRule>, ModerationError> {
            Ok(self
                .rules
                .iter()
                .filter(|r| r.active)
                .map(|r| r.clone())
                .collect())
        }

        async fn list_rules(&self) -> Result<Vec<ModerationRule>, ModerationError> {
            let mut rules: Vec<ModerationRule> = self.rules.iter().map(|r| r.clone()).collect();
            rules.sort_by_key(|r| r.id);
            Ok(rules)
        }

        async fn get_rule(&self, id: i64) -> Result<Option<ModerationRule>, ModerationError> {
            Ok(self.rules.get(&id).map(|r| r.clone()))
        }

        async fn create_rule(
            &self,
            draft: RuleDraft,
            now: DateTime<Utc>,
        ) -> Result<ModerationRule, ModerationError> {
            let rule = rule_from_draft(self.next_id(), draft, now);
            self.rules.insert(rule.id, rule.clone());
            Ok(rule)
        }

        async fn update_rule(
            &self,
            id: i64,
            draft: RuleDraft,
            now: DateTime<Utc>,
        ) -> Result<Option<ModerationRule>, ModerationError> {
            let Some(mut entry) = self.rules.get_mut(&id) else {
                return Ok(None);
            };
            let created_at = entry.created_at;
            let mut rule = rule_from_draft(id, draft, now);
            rule.created_at = created_at;
            *entry = rule.clone();
            Ok(Some(rule))
        }

        async fn set_rule_active(
            &self,
            id: i64,
            active: bool,
            now: DateTime<Utc>,
        ) -> Result<Option<ModerationRule>, ModerationError> {
            Ok(self.rules.get_mut(&id).map(|mut r| {
                r.active = active;
                r.updated_at = now;
                r.clone()
            }))
        }

        async fn delete_rule(&self, id: i64) -> Result<bool, ModerationError> {
            Ok(self.rules.remove(&id).is_some())
        }

        async fn record_report(
            &self,
            report: NewReport,
            now: DateTime<Utc>,
        ) -> Result<ModerationReport, ModerationError> {
            let stored = ModerationReport {
                id: self.next_id(),
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
            };
            self.reports.insert(stored.id, stored.clone());
            Ok(stored)
        }

        async fn list_reports(
            &self,
            status: Option<ReportStatus>,
            limit: u32,
        ) -> Result<Vec<ModerationReport>, ModerationError> {
            let mut reports: Vec<ModerationReport> = self
                .reports
                .iter()
                .filter(|r| status.map_or(true, |s| r.status == s))
                .map(|r| r.clone())
                .collect();
            reports.sort_by(|a, b| b.id.cmp(&a.id));
            reports.truncate(limit as usize);
            Ok(reports)
        }

        async fn review_report(
            &self,
            id: i64,
            status: ReportStatus,
            reviewer: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<ModerationReport>, ModerationError> {
            Ok(self.reports.get_mut(&id).map(|mut r| {
                r.status = status;
                r.reviewed_by = Some(reviewer.to_string());
                r.reviewed_at = Some(now);
                r.clone()
            }))
        }
    }

    fn draft(name: &str, keywords: &[&str], action: RuleAction) -> RuleDraft {
        RuleDraft {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            content_types: Vec::new(),
            severity: Severity::High,
            action,
            active: true,
            case_sensitive: false,
            whole_word_only: false,
            regex: None,
            exempt_roles: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_clean_content_allowed_and_not_queued() {
        let service = ModerationService::new(MockModerationStore::new());
        service
            .create_rule(draft("scams", &["scam"], RuleAction::Block))
            .await
            .unwrap();

        let item = ContentItem::new("l1", "listing", "Vintage lamp, great condition");
        let result = service.moderate(&item).await.unwrap();

        assert!(result.is_allowed());
        assert!(service.list_reports(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flagged_content_queued_as_pending() {
        let service = ModerationService::new(MockModerationStore::new());
        let rule = service
            .create_rule(draft("money", &["wire transfer"], RuleAction::Flag))
            .await
            .unwrap();

        let item = ContentItem::new("c9", "comment", "Pay by WIRE TRANSFER only")
            .with_author("u42", "user");
        let result = service.moderate(&item).await.unwrap();

        assert_eq!(result.action, RuleAction::Flag);
        assert_eq!(result.rule_id, Some(rule.id));

        let pending = service
            .list_reports(Some(ReportStatus::Pending), None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].content_id, "c9");
        assert_eq!(pending[0].author_id.as_deref(), Some("u42"));
        assert_eq!(pending[0].matched_term.as_deref(), Some("wire transfer"));
    }

    #[tokio::test]
    async fn test_blocked_content_queued_as_removed() {
        let service = ModerationService::new(MockModerationStore::new());
        service
            .create_rule(draft("scams", &["scam"], RuleAction::Block))
            .await
            .unwrap();

        let item = ContentItem::new("l2", "listing", "not a scam, promise");
        service.moderate(&item).await.unwrap();

        let removed = service
            .list_reports(Some(ReportStatus::Removed), None)
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].action, RuleAction::Block);
    }

    #[tokio::test]
    async fn test_allow_rule_is_not_queued() {
        let service = ModerationService::new(MockModerationStore::new());
        service
            .create_rule(draft("whitelist", &["charity"], RuleAction::Allow))
            .await
            .unwrap();

        let item = ContentItem::new("e1", "event", "charity fun run");
        let result = service.moderate(&item).await.unwrap();

        assert!(result.is_allowed());
        assert!(result.rule_id.is_some());
        assert!(service.list_reports(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_rule_skipped() {
        let service = ModerationService::new(MockModerationStore::new());
        let rule = service
            .create_rule(draft("scams", &["scam"], RuleAction::Block))
            .await
            .unwrap();
        service.set_rule_active(rule.id, false).await.unwrap();

        let item = ContentItem::new("l3", "listing", "scam");
        assert!(service.moderate(&item).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_drafts() {
        let service = ModerationService::new(MockModerationStore::new());

        let err = service
            .create_rule(draft("  ", &["x"], RuleAction::Flag))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));

        let err = service
            .create_rule(draft("empty", &["", " "], RuleAction::Flag))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));

        let mut bad_regex = draft("regex", &[], RuleAction::Flag);
        bad_regex.regex = Some("[a-".to_string());
        let err = service.create_rule(bad_regex).await.unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_regex_only_rule_is_valid() {
        let service = ModerationService::new(MockModerationStore::new());
        let mut regex_rule = draft("phones", &[], RuleAction::Flag);
        regex_rule.regex = Some(r"\d{3}-\d{4}".to_string());

        let rule = service.create_rule(regex_rule).await.unwrap();
        assert_eq!(rule.regex.as_deref(), Some(r"\d{3}-\d{4}"));
    }

    #[tokio::test]
    async fn test_create_normalizes_lists() {
        let service = ModerationService::new(MockModerationStore::new());
        let mut d = draft(" spam ", &[" buy ", "buy", "", "now"], RuleAction::Flag);
        d.content_types = vec![ContentType::Listing, ContentType::Listing];
        d.exempt_roles = vec!["admin".to_string(), " admin".to_string()];

        let rule = service.create_rule(d).await.unwrap();
        assert_eq!(rule.name, "spam");
        assert_eq!(rule.keywords, vec!["buy".to_string(), "now".to_string()]);
        assert_eq!(rule.content_types, vec![ContentType::Listing]);
        assert_eq!(rule.exempt_roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_rule() {
        let service = ModerationService::new(MockModerationStore::new());

        let err = service
            .update_rule(99, draft("x", &["x"], RuleAction::Flag))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));

        let err = service.delete_rule(99).await.unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rule_changes_matching() {
        let service = ModerationService::new(MockModerationStore::new());
        let rule = service
            .create_rule(draft("words", &["foo"], RuleAction::Flag))
            .await
            .unwrap();
        service
            .update_rule(rule.id, draft("words", &["bar"], RuleAction::Block))
            .await
            .unwrap();

        let foo = ContentItem::new("1", "comment", "foo");
        let bar = ContentItem::new("2", "comment", "bar");
        assert!(service.moderate(&foo).await.unwrap().is_allowed());
        assert_eq!(
            service.moderate(&bar).await.unwrap().action,
            RuleAction::Block
        );
    }

    #[tokio::test]
    async fn test_preview_draft_does_not_store() {
        let service = ModerationService::new(MockModerationStore::new());
        let mut d = draft("preview", &["cash"], RuleAction::Block);
        d.whole_word_only = true;
        d.active = false;

        let hit = service
            .preview_draft(d.clone(), &ContentItem::new("p", "classified", "cash only"))
            .unwrap();
        assert_eq!(hit.action, RuleAction::Block);

        let miss = service
            .preview_draft(d, &ContentItem::new("p", "classified", "cashew"))
            .unwrap();
        assert!(miss.is_allowed());
        assert!(service.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_report() {
        let service = ModerationService::new(MockModerationStore::new());
        service
            .create_rule(draft("money", &["cash app"], RuleAction::Flag))
            .await
            .unwrap();
        let item = ContentItem::new("m1", "message", "send it on cash app");
        service.moderate(&item).await.unwrap();

        let report = service.list_reports(None, None).await.unwrap().remove(0);
        let reviewed = service
            .review_report(report.id, ReviewDecision::Approve, "mod-1")
            .await
            .unwrap();

        assert_eq!(reviewed.status, ReportStatus::Approved);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("mod-1"));
        assert!(reviewed.reviewed_at.is_some());

        let err = service
            .review_report(12345, ReviewDecision::Remove, "mod-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));
    }
}
