// Rule matcher - evaluates content against keyword/regex moderation rules.
//
// Evaluation order: active rules only, severity descending, then rule id
// ascending. The first applicable, non-exempt rule that matches decides.

use super::moderation_models::{ContentItem, ModerationResult, ModerationRule};
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::sync::Arc;

/// Upper bound on compiled regex size so a hostile pattern can't eat memory.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Evaluate content against a rule set with a throwaway matcher.
pub fn evaluate(content: &ContentItem, rules: &[ModerationRule]) -> ModerationResult {
    RuleMatcher::new().evaluate(content, rules)
}

/// Rule matcher with a cache of compiled regex overrides.
///
/// Invalid patterns are cached as `None`, so they are only reported once.
pub struct RuleMatcher {
    regex_cache: DashMap<(String, bool), Option<Arc<Regex>>>,
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self {
            regex_cache: DashMap::new(),
        }
    }

    /// Resolve exactly one decision for the content item.
    pub fn evaluate(&self, content: &ContentItem, rules: &[ModerationRule]) -> ModerationResult {
        let Some(content_type) = content.kind() else {
            tracing::debug!(
                content_id = %content.id,
                content_type = %content.content_type,
                "Unknown content type, no rules apply"
            );
            return ModerationResult::allow();
        };

        let mut candidates: Vec<&ModerationRule> = rules
            .iter()
            .filter(|rule| rule.active && rule.applies_to(content_type))
            .collect();
        candidates.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.id.cmp(&b.id)));

        for rule in candidates {
            if rule.is_exempt(content.author_role.as_deref()) {
                continue;
            }

            if let Some(term) = self.match_rule(rule, &content.text) {
                return ModerationResult::matched(rule, term);
            }
        }

        ModerationResult::allow()
    }

    /// Test text against a single rule, returning the matched term.
    pub fn match_rule(&self, rule: &ModerationRule, text: &str) -> Option<String> {
        let pattern = rule.regex.as_deref().map(str::trim).filter(|p| !p.is_empty());

        if let Some(pattern) = pattern {
            if let Some(regex) = self.compiled(rule.id, pattern, rule.case_sensitive) {
                return regex.find(text).map(|m| m.as_str().to_string());
            }
            // Malformed override: fall through to keywords
        }

        rule.keywords
            .iter()
            .find_map(|keyword| find_keyword(text, keyword, rule.case_sensitive, rule.whole_word_only))
    }

    /// Drop cached patterns that no active rule in `rules` still uses.
    pub fn retain_rules(&self, rules: &[ModerationRule]) {
        self.regex_cache.retain(|(pattern, case_sensitive), _| {
            rules.iter().any(|rule| {
                rule.active
                    && rule.case_sensitive == *case_sensitive
                    && rule.regex.as_deref().map(str::trim) == Some(pattern.as_str())
            })
        });
    }

    fn compiled(&self, rule_id: i64, pattern: &str, case_sensitive: bool) -> Option<Arc<Regex>> {
        let key = (pattern.to_string(), case_sensitive);
        if let Some(cached) = self.regex_cache.get(&key) {
            return cached.value().clone();
        }

        let compiled = match build_regex(pattern, case_sensitive) {
            Ok(regex) => Some(Arc::new(regex)),
            Err(e) => {
                tracing::warn!(
                    rule_id,
                    pattern,
                    error = %e,
                    "Invalid moderation regex, falling back to keywords"
                );
                None
            }
        };

        self.regex_cache.insert(key, compiled.clone());
        compiled
    }
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a rule's regex override with the rule's case flag.
pub fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

/// Find a keyword in text. Returns the keyword as configured on a hit.
fn find_keyword(text: &str, keyword: &str, case_sensitive: bool, whole_word: bool) -> Option<String> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return None;
    }

    let (haystack, needle): (Cow<str>, Cow<str>) = if case_sensitive {
        (Cow::Borrowed(text), Cow::Borrowed(keyword))
    } else {
        (Cow::Owned(text.to_lowercase()), Cow::Owned(keyword.to_lowercase()))
    };

    let mut start = 0;
    while let Some(offset) = haystack[start..].find(needle.as_ref()) {
        let begin = start + offset;
        let end = begin + needle.len();

        if !whole_word || is_whole_word(&haystack, begin, end) {
            return Some(keyword.to_string());
        }

        // Step one character forward and keep looking
        start = begin + haystack[begin..].chars().next().map_or(1, char::len_utf8);
    }

    None
}

fn is_whole_word(haystack: &str, begin: usize, end: usize) -> bool {
    let before = haystack[..begin].chars().next_back();
    let after = haystack[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
