// Moderation domain models - rules, content items and decisions.
//
// These are pure domain types with no HTTP or database dependencies.
// The web layer converts them to JSON, the infra layer to table rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a rule violation is. Ordering is used for rule priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What should happen to content that matched a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Publish as normal
    Allow,
    /// Publish, but queue for moderator review
    Flag,
    /// Reject the submission
    Block,
    /// Publish then take down immediately
    AutoRemove,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Flag => "flag",
            RuleAction::Block => "block",
            RuleAction::AutoRemove => "auto_remove",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(RuleAction::Allow),
            "flag" => Some(RuleAction::Flag),
            "block" => Some(RuleAction::Block),
            "auto_remove" => Some(RuleAction::AutoRemove),
            _ => None,
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of user content the platform moderates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Listing,
    Classified,
    Event,
    Comment,
    Review,
    Message,
    Profile,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Listing => "listing",
            ContentType::Classified => "classified",
            ContentType::Event => "event",
            ContentType::Comment => "comment",
            ContentType::Review => "review",
            ContentType::Message => "message",
            ContentType::Profile => "profile",
        }
    }

    /// Returns `None` for content types the platform doesn't know about.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "listing" => Some(ContentType::Listing),
            "classified" => Some(ContentType::Classified),
            "event" => Some(ContentType::Event),
            "comment" => Some(ContentType::Comment),
            "review" => Some(ContentType::Review),
            "message" => Some(ContentType::Message),
            "profile" => Some(ContentType::Profile),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured keyword/regex moderation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationRule {
    pub id: i64,
    pub name: String,
    pub keywords: Vec<String>,
    /// Content types this rule applies to. Empty means all known types.
    pub content_types: Vec<ContentType>,
    pub severity: Severity,
    pub action: RuleAction,
    pub active: bool,
    pub case_sensitive: bool,
    pub whole_word_only: bool,
    /// When present and valid, replaces keyword matching.
    pub regex: Option<String>,
    /// Author roles that bypass this rule.
    pub exempt_roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationRule {
    /// Whether this rule should be checked for the given content type.
    pub fn applies_to(&self, content_type: ContentType) -> bool {
        self.content_types.is_empty() || self.content_types.contains(&content_type)
    }

    /// Whether an author with this role is exempt from the rule.
    pub fn is_exempt(&self, role: Option<&str>) -> bool {
        match role {
            Some(role) => self
                .exempt_roles
                .iter()
                .any(|exempt| exempt.trim().eq_ignore_ascii_case(role.trim())),
            None => false,
        }
    }
}

/// Input for creating or replacing a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub content_types: Vec<ContentType>,
    pub severity: Severity,
    pub action: RuleAction,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word_only: bool,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub exempt_roles: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// A piece of user content to moderate. Built per call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    /// Raw content type as submitted; see [`ContentItem::kind`].
    pub content_type: String,
    pub text: String,
    pub author_id: Option<String>,
    pub author_role: Option<String>,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        content_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            text: text.into(),
            author_id: None,
            author_role: None,
        }
    }

    pub fn with_author(mut self, author_id: impl Into<String>, role: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self.author_role = Some(role.into());
        self
    }

    /// Resolved content type, or `None` when the type is unknown.
    pub fn kind(&self) -> Option<ContentType> {
        ContentType::parse(&self.content_type)
    }
}

/// The single resolved decision for a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub action: RuleAction,
    pub rule_id: Option<i64>,
    pub rule_name: Option<String>,
    pub severity: Option<Severity>,
    /// The keyword or regex match that triggered the rule
    pub matched_term: Option<String>,
}

impl ModerationResult {
    /// No rule matched.
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            rule_id: None,
            rule_name: None,
            severity: None,
            matched_term: None,
        }
    }

    /// A rule matched.
    pub fn matched(rule: &ModerationRule, matched_term: String) -> Self {
        Self {
            action: rule.action,
            rule_id: Some(rule.id),
            rule_name: Some(rule.name.clone()),
            severity: Some(rule.severity),
            matched_term: Some(matched_term),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.action == RuleAction::Allow
    }
}

/// Where a queued moderation decision stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Flagged, waiting for a moderator
    Pending,
    /// A moderator cleared the content
    Approved,
    /// Content was blocked, auto-removed, or removed on review
    Removed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Approved => "approved",
            ReportStatus::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ReportStatus::Pending),
            "approved" => Some(ReportStatus::Approved),
            "removed" => Some(ReportStatus::Removed),
            _ => None,
        }
    }

    /// Initial queue status for a non-allow decision.
    pub fn for_action(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => ReportStatus::Approved,
            RuleAction::Flag => ReportStatus::Pending,
            RuleAction::Block | RuleAction::AutoRemove => ReportStatus::Removed,
        }
    }
}

/// Moderator verdict on a queued report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Remove,
}

impl ReviewDecision {
    pub fn status(&self) -> ReportStatus {
        match self {
            ReviewDecision::Approve => ReportStatus::Approved,
            ReviewDecision::Remove => ReportStatus::Removed,
        }
    }
}

/// A non-allow decision recorded for moderator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationReport {
    pub id: i64,
    pub content_id: String,
    pub content_type: String,
    pub author_id: Option<String>,
    pub rule_id: i64,
    pub rule_name: String,
    pub severity: Severity,
    pub action: RuleAction,
    pub matched_term: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Data needed to insert a report; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub content_id: String,
    pub content_type: String,
    pub author_id: Option<String>,
    pub rule_id: i64,
    pub rule_name: String,
    pub severity: Severity,
    pub action: RuleAction,
    pub matched_term: Option<String>,
    pub status: ReportStatus,
}
