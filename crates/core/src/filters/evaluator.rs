//! Rule evaluator.
//!
//! Deterministic given identical flood cache state: re-evaluating the
//! same candidate without committing produces the same outcome.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use super::rules::{
    flood_scope_key, FilterAction, FilterCondition, FilterOutcome, FilterRule, FloodField,
    TextField,
};
use crate::error::CoreError;
use crate::models::PostCandidate;
use crate::ports::FloodCache;
use crate::types::Timestamp;

/// A named predicate implementation, e.g. a per-hour thread counter or a
/// board lookup limit. Receives the full candidate.
#[async_trait]
pub trait CustomPredicate: Send + Sync {
    async fn matches(&self, candidate: &PostCandidate) -> Result<bool, CoreError>;
}

/// Maps predicate names referenced by [`FilterCondition::Custom`] to
/// implementations.
#[derive(Default, Clone)]
pub struct PredicateRegistry {
    entries: HashMap<String, Arc<dyn CustomPredicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, predicate: Arc<dyn CustomPredicate>) {
        self.entries.insert(name.into(), predicate);
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn CustomPredicate>> {
        self.entries.get(name)
    }
}

/// Everything a single evaluation needs besides the rules themselves.
pub struct EvalInput<'a> {
    pub candidate: &'a PostCandidate,
    /// Combined fingerprint of the candidate's uploads, if any.
    pub file_fingerprint: Option<&'a str>,
    /// Evaluation instant; flood windows are measured back from here.
    pub now: Timestamp,
}

/// Try the rules in configured order; the first rule whose conditions all
/// hold returns its (terminal) action.
pub async fn evaluate(
    rules: &[FilterRule],
    input: &EvalInput<'_>,
    flood: &dyn FloodCache,
    predicates: &PredicateRegistry,
) -> Result<FilterOutcome, CoreError> {
    for rule in rules {
        let mut matched = true;
        for condition in &rule.conditions {
            if !condition_holds(condition, input, flood, predicates).await? {
                matched = false;
                break;
            }
        }
        if matched {
            return Ok(match &rule.action {
                FilterAction::Reject { message } => {
                    FilterOutcome::Reject { message: message.clone() }
                }
                FilterAction::Ban { message, reason, duration_secs } => FilterOutcome::Ban {
                    message: message.clone(),
                    reason: reason.clone(),
                    duration_secs: *duration_secs,
                },
            });
        }
    }
    Ok(FilterOutcome::Allow)
}

fn condition_holds<'a>(
    condition: &'a FilterCondition,
    input: &'a EvalInput<'a>,
    flood: &'a dyn FloodCache,
    predicates: &'a PredicateRegistry,
) -> Pin<Box<dyn Future<Output = Result<bool, CoreError>> + Send + 'a>> {
    Box::pin(async move {
        match condition {
            FilterCondition::FloodMatch { fields, window_secs, min_count } => {
                flood_match_holds(fields, *window_secs, *min_count, input, flood).await
            }
            FilterCondition::FieldRegex { field, pattern } => {
                let re = Regex::new(pattern).map_err(|e| {
                    CoreError::Config(format!("invalid filter regex {pattern:?}: {e}"))
                })?;
                Ok(re.is_match(text_field(input.candidate, *field)))
            }
            FilterCondition::EmptyBody => Ok(input.candidate.body.trim().is_empty()),
            FilterCondition::Negated(inner) => {
                Ok(!condition_holds(inner, input, flood, predicates).await?)
            }
            FilterCondition::Custom(name) => match predicates.get(name) {
                Some(predicate) => predicate.matches(input.candidate).await,
                None => Err(CoreError::Config(format!(
                    "filter references unknown predicate {name:?}"
                ))),
            },
        }
    })
}

async fn flood_match_holds(
    fields: &[FloodField],
    window_secs: i64,
    min_count: u64,
    input: &EvalInput<'_>,
    flood: &dyn FloodCache,
) -> Result<bool, CoreError> {
    // An empty body never flood-matches against other empty bodies; the
    // same goes for a missing file fingerprint. Without this, every
    // bodyless post would count as a repeat of every other one.
    for field in fields {
        let empty = match field {
            FloodField::Body => input.candidate.body.trim().is_empty(),
            FloodField::File => input.file_fingerprint.is_none(),
            FloodField::Ip => false,
        };
        if empty {
            return Ok(false);
        }
    }

    let key = flood_scope_key(fields, input.candidate, input.file_fingerprint);
    let cutoff = input.now - chrono::Duration::seconds(window_secs);
    let count = flood
        .count_since(&key, &input.candidate.board, cutoff)
        .await?;
    Ok(count >= min_count)
}

fn text_field(candidate: &PostCandidate, field: TextField) -> &str {
    match field {
        TextField::Name => &candidate.name,
        TextField::Email => &candidate.email,
        TextField::Subject => &candidate.subject,
        TextField::Body => &candidate.body,
        TextField::Filename => candidate
            .files
            .first()
            .map(|f| f.name.as_str())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::rules::default_rules;
    use crate::models::{FloodEntry, PostCandidate};
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    /// Flood cache backed by a plain vector, for evaluator tests.
    #[derive(Default)]
    struct VecFlood {
        entries: Mutex<Vec<FloodEntry>>,
    }

    #[async_trait]
    impl FloodCache for VecFlood {
        async fn append(&self, entry: &FloodEntry) -> Result<(), CoreError> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn count_since(
            &self,
            scope_key: &str,
            board: &str,
            cutoff: Timestamp,
        ) -> Result<u64, CoreError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.scope_key == scope_key && e.board == board && e.time >= cutoff)
                .count() as u64)
        }

        async fn purge_older_than(&self, board: &str, cutoff: Timestamp) -> Result<u64, CoreError> {
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|e| e.board != board || e.time >= cutoff);
            Ok((before - entries.len()) as u64)
        }
    }

    fn candidate(ip: &str, body: &str) -> PostCandidate {
        PostCandidate {
            board: "b".to_string(),
            thread: None,
            ip: ip.to_string(),
            name: "Anonymous".to_string(),
            email: String::new(),
            subject: String::new(),
            body: body.to_string(),
            files: Vec::new(),
            moderator: false,
        }
    }

    fn input<'a>(candidate: &'a PostCandidate, now: Timestamp) -> EvalInput<'a> {
        EvalInput { candidate, file_fingerprint: None, now }
    }

    async fn record(flood: &VecFlood, c: &PostCandidate, fields: &[FloodField], time: Timestamp) {
        let key = flood_scope_key(fields, c, None);
        flood
            .append(&FloodEntry { scope_key: key, board: c.board.clone(), time })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn clean_candidate_is_allowed() {
        let flood = VecFlood::default();
        let rules = default_rules(10, 120, 30, "flood");
        let c = candidate("1.2.3.4", "first post");

        let outcome = evaluate(&rules, &input(&c, Utc::now()), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_eq!(outcome, FilterOutcome::Allow);
    }

    #[tokio::test]
    async fn repeat_within_window_is_rejected() {
        let flood = VecFlood::default();
        let rules = default_rules(10, 120, 30, "flood");
        let now = Utc::now();
        let c = candidate("1.2.3.4", "same text");
        record(&flood, &c, &[FloodField::Ip], now - Duration::seconds(5)).await;

        let outcome = evaluate(&rules, &input(&c, now), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_matches!(outcome, FilterOutcome::Reject { .. });
    }

    #[tokio::test]
    async fn repeat_after_window_elapses_is_allowed() {
        let flood = VecFlood::default();
        let rules = default_rules(10, 120, 30, "flood");
        let now = Utc::now();
        let c = candidate("1.2.3.4", "same text");
        // Older than every configured window.
        for fields in [
            vec![FloodField::Ip],
            vec![FloodField::Ip, FloodField::Body],
            vec![FloodField::Body],
        ] {
            record(&flood, &c, &fields, now - Duration::seconds(300)).await;
        }

        let outcome = evaluate(&rules, &input(&c, now), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_eq!(outcome, FilterOutcome::Allow);
    }

    #[tokio::test]
    async fn evaluation_is_deterministic_without_commit() {
        let flood = VecFlood::default();
        let rules = default_rules(10, 120, 30, "flood");
        let now = Utc::now();
        let c = candidate("1.2.3.4", "text");
        record(&flood, &c, &[FloodField::Body], now - Duration::seconds(2)).await;

        let first = evaluate(&rules, &input(&c, now), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        let second = evaluate(&rules, &input(&c, now), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_bodies_do_not_flood_each_other() {
        let flood = VecFlood::default();
        let rules = vec![FilterRule {
            conditions: vec![FilterCondition::FloodMatch {
                fields: vec![FloodField::Body],
                window_secs: 60,
                min_count: 1,
            }],
            action: FilterAction::Reject { message: "flood".to_string() },
        }];
        let now = Utc::now();
        let c = candidate("1.2.3.4", "");
        record(&flood, &c, &[FloodField::Body], now - Duration::seconds(1)).await;

        let outcome = evaluate(&rules, &input(&c, now), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_eq!(outcome, FilterOutcome::Allow);
    }

    #[tokio::test]
    async fn min_count_requires_enough_recent_entries() {
        let flood = VecFlood::default();
        let rules = vec![FilterRule {
            conditions: vec![FilterCondition::FloodMatch {
                fields: vec![FloodField::Ip],
                window_secs: 60,
                min_count: 2,
            }],
            action: FilterAction::Reject { message: "flood".to_string() },
        }];
        let now = Utc::now();
        let c = candidate("1.2.3.4", "x");
        record(&flood, &c, &[FloodField::Ip], now - Duration::seconds(10)).await;

        let first = evaluate(&rules, &input(&c, now), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_eq!(first, FilterOutcome::Allow);

        record(&flood, &c, &[FloodField::Ip], now - Duration::seconds(5)).await;
        let second = evaluate(&rules, &input(&c, now), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_matches!(second, FilterOutcome::Reject { .. });
    }

    #[tokio::test]
    async fn regex_rule_matches_field() {
        let flood = VecFlood::default();
        let rules = vec![FilterRule {
            conditions: vec![FilterCondition::FieldRegex {
                field: TextField::Body,
                pattern: r"https?://\S+\.example\.com".to_string(),
            }],
            action: FilterAction::Reject { message: "spam link".to_string() },
        }];
        let c = candidate("1.2.3.4", "buy at http://shop.example.com now");

        let outcome = evaluate(&rules, &input(&c, Utc::now()), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_matches!(outcome, FilterOutcome::Reject { message } if message == "spam link");
    }

    #[tokio::test]
    async fn negated_empty_body_guards_bodyless_posts() {
        let flood = VecFlood::default();
        let rules = vec![FilterRule {
            conditions: vec![
                FilterCondition::Negated(Box::new(FilterCondition::EmptyBody)),
                FilterCondition::FieldRegex {
                    field: TextField::Body,
                    pattern: ".*".to_string(),
                },
            ],
            action: FilterAction::Reject { message: "no".to_string() },
        }];
        let empty = candidate("1.2.3.4", "   ");

        let outcome = evaluate(&rules, &input(&empty, Utc::now()), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_eq!(outcome, FilterOutcome::Allow);
    }

    #[tokio::test]
    async fn first_matching_terminal_rule_wins() {
        let flood = VecFlood::default();
        let rules = vec![
            FilterRule {
                conditions: vec![FilterCondition::FieldRegex {
                    field: TextField::Body,
                    pattern: "spam".to_string(),
                }],
                action: FilterAction::Reject { message: "first".to_string() },
            },
            FilterRule {
                conditions: vec![FilterCondition::FieldRegex {
                    field: TextField::Body,
                    pattern: "spam".to_string(),
                }],
                action: FilterAction::Reject { message: "second".to_string() },
            },
        ];
        let c = candidate("1.2.3.4", "spam");

        let outcome = evaluate(&rules, &input(&c, Utc::now()), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_matches!(outcome, FilterOutcome::Reject { message } if message == "first");
    }

    #[tokio::test]
    async fn ban_action_carries_duration_and_reason() {
        let flood = VecFlood::default();
        let rules = vec![FilterRule {
            conditions: vec![FilterCondition::FieldRegex {
                field: TextField::Name,
                pattern: "^troll$".to_string(),
            }],
            action: FilterAction::Ban {
                message: "banned".to_string(),
                reason: "known troll name".to_string(),
                duration_secs: Some(3600),
            },
        }];
        let mut c = candidate("1.2.3.4", "hello");
        c.name = "troll".to_string();

        let outcome = evaluate(&rules, &input(&c, Utc::now()), &flood, &PredicateRegistry::new())
            .await
            .unwrap();
        assert_matches!(
            outcome,
            FilterOutcome::Ban { duration_secs: Some(3600), .. }
        );
    }

    #[tokio::test]
    async fn custom_predicate_is_resolved_by_name() {
        struct AlwaysMatch;

        #[async_trait]
        impl CustomPredicate for AlwaysMatch {
            async fn matches(&self, _candidate: &PostCandidate) -> Result<bool, CoreError> {
                Ok(true)
            }
        }

        let flood = VecFlood::default();
        let mut registry = PredicateRegistry::new();
        registry.register("always", Arc::new(AlwaysMatch));
        let rules = vec![FilterRule {
            conditions: vec![FilterCondition::Custom("always".to_string())],
            action: FilterAction::Reject { message: "nope".to_string() },
        }];
        let c = candidate("1.2.3.4", "anything");

        let outcome = evaluate(&rules, &input(&c, Utc::now()), &flood, &registry)
            .await
            .unwrap();
        assert_matches!(outcome, FilterOutcome::Reject { .. });
    }

    #[tokio::test]
    async fn unknown_predicate_is_a_configuration_error() {
        let flood = VecFlood::default();
        let rules = vec![FilterRule {
            conditions: vec![FilterCondition::Custom("missing".to_string())],
            action: FilterAction::Reject { message: "nope".to_string() },
        }];
        let c = candidate("1.2.3.4", "anything");

        let err = evaluate(&rules, &input(&c, Utc::now()), &flood, &PredicateRegistry::new())
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Config(_));
    }
}
