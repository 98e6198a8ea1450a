//! First-match rule evaluation.
//!
//! Rules arrive ordered by ascending priority and are evaluated in that
//! order; the first matcher that fires decides the route. There is no
//! scoring or best-match search. A malformed regex pattern is treated
//! as non-matching, never as an error.

use regex::RegexBuilder;

use super::models::{FieldMapping, MatcherType, Rule};

/// A routing decision produced by the first matching rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub destination_id: String,
    /// Message text, with the matched pattern stripped when the rule
    /// asks for it.
    pub cleaned_text: String,
    pub mapping: FieldMapping,
}

/// Evaluate `rules` (already priority-ordered) against `text`.
pub fn match_rules(text: &str, rules: &[Rule]) -> Option<RouteDecision> {
    rules.iter().find_map(|rule| {
        if !matches(text, rule) {
            return None;
        }
        let cleaned_text = if rule.remove_pattern {
            strip_pattern(text, rule)
        } else {
            text.to_string()
        };
        Some(RouteDecision {
            destination_id: rule.destination_id.clone(),
            cleaned_text,
            mapping: rule.field_mapping.clone(),
        })
    })
}

fn matches(text: &str, rule: &Rule) -> bool {
    match rule.matcher_type {
        MatcherType::Prefix => {
            if rule.case_sensitive {
                text.starts_with(&rule.pattern)
            } else {
                literal_regex(&rule.pattern, true)
                    .map(|re| re.is_match(text))
                    .unwrap_or(false)
            }
        }
        MatcherType::Keyword => {
            if rule.case_sensitive {
                text.contains(&rule.pattern)
            } else {
                literal_regex(&rule.pattern, false)
                    .map(|re| re.is_match(text))
                    .unwrap_or(false)
            }
        }
        // `contains` ignores the rule's case flag entirely.
        MatcherType::Contains => literal_regex(&rule.pattern, false)
            .map(|re| re.is_match(text))
            .unwrap_or(false),
        MatcherType::Regex => compile_regex(rule)
            .map(|re| re.is_match(text))
            .unwrap_or(false),
    }
}

/// Regex is case-insensitive unless the rule opts out.
fn compile_regex(rule: &Rule) -> Option<regex::Regex> {
    RegexBuilder::new(&rule.pattern)
        .case_insensitive(!rule.case_sensitive)
        .build()
        .ok()
}

/// Case-insensitive matcher for a literal pattern, optionally anchored
/// to the start. All offsets it reports are byte positions in the
/// original text, so stripping stays safe on non-ASCII input where a
/// lowercased copy has different byte lengths.
fn literal_regex(pattern: &str, anchored: bool) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern);
    let source = if anchored {
        format!("^{escaped}")
    } else {
        escaped
    };
    RegexBuilder::new(&source).case_insensitive(true).build().ok()
}

fn strip_pattern(text: &str, rule: &Rule) -> String {
    let stripped = match rule.matcher_type {
        // Prefix strips only the leading occurrence.
        MatcherType::Prefix => {
            if rule.case_sensitive {
                text.strip_prefix(&rule.pattern).unwrap_or(text).to_string()
            } else {
                match literal_regex(&rule.pattern, true).and_then(|re| re.find(text)) {
                    Some(m) => text[m.end()..].to_string(),
                    None => text.to_string(),
                }
            }
        }
        // Keyword respects the case flag; contains never does.
        MatcherType::Keyword => {
            if rule.case_sensitive {
                text.replace(&rule.pattern, "")
            } else {
                remove_all_occurrences(text, &rule.pattern)
            }
        }
        MatcherType::Contains => remove_all_occurrences(text, &rule.pattern),
        MatcherType::Regex => match compile_regex(rule) {
            Some(re) => re.replace_all(text, "").into_owned(),
            None => text.to_string(),
        },
    };
    stripped.trim().to_string()
}

/// Remove every occurrence of `pattern`, case-insensitively.
fn remove_all_occurrences(text: &str, pattern: &str) -> String {
    if pattern.is_empty() {
        return text.to_string();
    }
    match literal_regex(pattern, false) {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}
