//! Work policy: URL classification rules and monitoring toggles.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::segment::SegmentKind;
use crate::types::WorkId;

/// One URL classification rule.
///
/// Pairs a URL pattern with an extractor whose first capture group yields the
/// work identifier. The rule list is ordered and the first matching pattern
/// wins, so order must survive serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUrlRule {
    pub url_pattern: String,
    pub work_id_extractor: String,
}

/// The classification policy for one user session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    /// Ordered rule list; the first matching pattern wins.
    pub work_urls: Vec<WorkUrlRule>,
    pub monitor_idle_time: bool,
    pub monitor_non_work_time: bool,
}

/// Error from compiling a single classification rule.
#[derive(Debug, Error)]
#[error("invalid URL pattern {pattern:?}: {source}")]
pub struct RuleError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A rule compiled and validated at policy load time.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    url_pattern: Regex,
    work_id_extractor: Option<Regex>,
}

impl CompiledRule {
    /// Validates and compiles one rule.
    ///
    /// The URL pattern must compile (after stripping one leading and one
    /// trailing `/` delimiter). A work-id extractor that does not compile
    /// leaves a usable rule whose matches carry no work id.
    pub fn compile(rule: &WorkUrlRule) -> Result<Self, RuleError> {
        let pattern = normalize_pattern(&rule.url_pattern);
        let url_pattern = Regex::new(pattern).map_err(|source| RuleError {
            pattern: rule.url_pattern.clone(),
            source,
        })?;

        let work_id_extractor = match Regex::new(&rule.work_id_extractor) {
            Ok(extractor) => Some(extractor),
            Err(error) => {
                tracing::warn!(
                    pattern = %rule.work_id_extractor,
                    %error,
                    "work-id extractor does not compile; matches will carry no work id"
                );
                None
            }
        };

        Ok(Self {
            url_pattern,
            work_id_extractor,
        })
    }

    fn matches(&self, url: &str) -> bool {
        self.url_pattern.is_match(url)
    }

    fn extract_work_id(&self, url: &str) -> Option<WorkId> {
        self.work_id_extractor
            .as_ref()
            .and_then(|extractor| extractor.captures(url))
            .and_then(|captures| captures.get(1))
            .and_then(|group| WorkId::new(group.as_str()).ok())
    }
}

/// Strips one leading and one trailing `/` delimiter, if present.
fn normalize_pattern(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
    pattern.strip_suffix('/').unwrap_or(pattern)
}

/// Outcome of classifying one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: SegmentKind,
    pub work_id: Option<WorkId>,
}

/// A policy with its rule list compiled for classification.
///
/// Malformed rules are isolated at compile time rather than rediscovered on
/// every classification call.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    id: i64,
    rules: Vec<CompiledRule>,
    monitor_idle_time: bool,
    monitor_non_work_time: bool,
}

impl CompiledPolicy {
    /// Compiles a policy, skipping (and logging) rules that do not compile.
    pub fn compile(policy: &Policy) -> Self {
        let mut rules = Vec::with_capacity(policy.work_urls.len());
        for rule in &policy.work_urls {
            match CompiledRule::compile(rule) {
                Ok(compiled) => rules.push(compiled),
                Err(error) => {
                    tracing::warn!(policy = policy.id, %error, "skipping malformed classification rule");
                }
            }
        }
        Self {
            id: policy.id,
            rules,
            monitor_idle_time: policy.monitor_idle_time,
            monitor_non_work_time: policy.monitor_non_work_time,
        }
    }

    /// Classifies a URL against the ordered rule list; first match wins.
    ///
    /// No match classifies as non-work. A matching rule without a usable
    /// extractor (or whose extractor captures nothing) yields work with no
    /// work id.
    pub fn classify(&self, url: &str) -> Classification {
        for rule in &self.rules {
            if rule.matches(url) {
                return Classification {
                    kind: SegmentKind::Work,
                    work_id: rule.extract_work_id(url),
                };
            }
        }
        Classification {
            kind: SegmentKind::NonWork,
            work_id: None,
        }
    }

    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Number of rules that survived compilation.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub const fn monitor_idle_time(&self) -> bool {
        self.monitor_idle_time
    }

    pub const fn monitor_non_work_time(&self) -> bool {
        self.monitor_non_work_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(url_pattern: &str, work_id_extractor: &str) -> WorkUrlRule {
        WorkUrlRule {
            url_pattern: url_pattern.to_string(),
            work_id_extractor: work_id_extractor.to_string(),
        }
    }

    fn policy(work_urls: Vec<WorkUrlRule>) -> Policy {
        Policy {
            id: 1,
            work_urls,
            monitor_idle_time: true,
            monitor_non_work_time: true,
        }
    }

    #[test]
    fn classifies_work_url_and_extracts_id() {
        let compiled = CompiledPolicy::compile(&policy(vec![rule(r"/work/(\d+)", r"/work/(\d+)")]));
        let result = compiled.classify("https://x/work/42");
        assert_eq!(result.kind, SegmentKind::Work);
        assert_eq!(result.work_id.unwrap().as_str(), "42");
    }

    #[test]
    fn classifies_unmatched_url_as_non_work() {
        let compiled = CompiledPolicy::compile(&policy(vec![rule(r"/work/(\d+)", r"/work/(\d+)")]));
        let result = compiled.classify("https://news.example.com");
        assert_eq!(result.kind, SegmentKind::NonWork);
        assert!(result.work_id.is_none());
    }

    #[test]
    fn first_matching_rule_wins() {
        let compiled = CompiledPolicy::compile(&policy(vec![
            rule(r"example\.com/issues/(\d+)", r"issues/(\d+)"),
            rule(r"example\.com", r"example\.com/(\w+)"),
        ]));
        let result = compiled.classify("https://example.com/issues/99");
        assert_eq!(result.work_id.unwrap().as_str(), "99");
    }

    #[test]
    fn strips_one_leading_and_trailing_delimiter() {
        let compiled = CompiledPolicy::compile(&policy(vec![rule(r"/tracker\.example\.com/", "")]));
        let result = compiled.classify("https://tracker.example.com/board");
        assert_eq!(result.kind, SegmentKind::Work);
    }

    #[test]
    fn malformed_url_pattern_is_skipped_not_fatal() {
        let compiled = CompiledPolicy::compile(&policy(vec![
            rule(r"[invalid", r"(\d+)"),
            rule(r"example\.com", r"example\.com/(\w+)"),
        ]));
        assert_eq!(compiled.rule_count(), 1);
        let result = compiled.classify("https://example.com/abc");
        assert_eq!(result.kind, SegmentKind::Work);
    }

    #[test]
    fn malformed_extractor_keeps_rule_without_work_id() {
        let compiled = CompiledPolicy::compile(&policy(vec![rule(r"example\.com", r"[invalid")]));
        assert_eq!(compiled.rule_count(), 1);
        let result = compiled.classify("https://example.com");
        assert_eq!(result.kind, SegmentKind::Work);
        assert!(result.work_id.is_none());
    }

    #[test]
    fn extractor_without_capture_yields_no_work_id() {
        let compiled = CompiledPolicy::compile(&policy(vec![rule(r"example\.com", r"example\.com")]));
        let result = compiled.classify("https://example.com");
        assert_eq!(result.kind, SegmentKind::Work);
        assert!(result.work_id.is_none());
    }

    #[test]
    fn rule_wire_shape_is_camel_case() {
        let json = serde_json::to_value(rule(r"/work/(\d+)", r"/work/(\d+)")).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("urlPattern"));
        assert!(object.contains_key("workIdExtractor"));
    }

    #[test]
    fn rule_list_order_survives_roundtrip() {
        let rules = vec![
            rule(r"a\.example\.com/(\d+)", r"/(\d+)"),
            rule(r"b\.example\.com/(\d+)", r"/(\d+)"),
            rule(r"c\.example\.com/(\d+)", r"/(\d+)"),
        ];
        let json = serde_json::to_string(&rules).unwrap();
        let parsed: Vec<WorkUrlRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rules);
    }

    #[test]
    fn normalize_pattern_strips_single_delimiters_only() {
        assert_eq!(normalize_pattern("/abc/"), "abc");
        assert_eq!(normalize_pattern("abc"), "abc");
        assert_eq!(normalize_pattern("//abc//"), "/abc/");
        assert_eq!(normalize_pattern("/abc"), "abc");
    }
}
