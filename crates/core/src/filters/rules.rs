//! Filter rule and outcome types.

use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex_concat;
use crate::models::PostCandidate;

/// Candidate fields a flood-match condition may key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloodField {
    Ip,
    Body,
    /// The combined content fingerprint of the candidate's uploads.
    File,
}

/// Text fields a regex condition may match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    Name,
    Email,
    Subject,
    Body,
    /// Client-supplied name of the first upload.
    Filename,
}

/// One condition of a filter rule. A rule matches iff all its conditions
/// hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterCondition {
    /// Holds when at least `min_count` flood cache entries share this
    /// candidate's scope key within the window.
    FloodMatch {
        fields: Vec<FloodField>,
        window_secs: i64,
        /// Minimum matching entries; 1 means any prior occurrence.
        #[serde(default = "default_min_count")]
        min_count: u64,
    },
    /// Holds when `pattern` matches the selected field.
    FieldRegex { field: TextField, pattern: String },
    /// Holds when the body is empty after trimming.
    EmptyBody,
    /// Inverts the inner condition, e.g. a non-empty-body guard.
    Negated(Box<FilterCondition>),
    /// Resolved by name against the predicate registry.
    Custom(String),
}

fn default_min_count() -> u64 {
    1
}

/// What a matching rule does. Both kinds are terminal: evaluation stops
/// at the first fully matching rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FilterAction {
    Reject {
        message: String,
    },
    Ban {
        message: String,
        reason: String,
        /// `None` bans permanently.
        duration_secs: Option<i64>,
    },
}

/// An ordered abuse rule: all conditions plus one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    pub conditions: Vec<FilterCondition>,
    pub action: FilterAction,
}

/// Result of evaluating a candidate against the rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Allow,
    Reject {
        message: String,
    },
    Ban {
        message: String,
        reason: String,
        duration_secs: Option<i64>,
    },
}

/// Scope key for a flood-match condition: hash of the selected field
/// values in declaration order, NUL-separated to keep field boundaries
/// unambiguous.
pub fn flood_scope_key(
    fields: &[FloodField],
    candidate: &PostCandidate,
    file_fingerprint: Option<&str>,
) -> String {
    let mut segments: Vec<&[u8]> = Vec::with_capacity(fields.len() * 2);
    for field in fields {
        match field {
            FloodField::Ip => segments.push(candidate.ip.as_bytes()),
            FloodField::Body => segments.push(candidate.body.as_bytes()),
            FloodField::File => {
                segments.push(file_fingerprint.unwrap_or_default().as_bytes())
            }
        }
        segments.push(b"\0");
    }
    sha256_hex_concat(&segments)
}

/// The stock flood rules every board starts with, mirroring the classic
/// three-window configuration: a minimum pause per IP, a longer pause for
/// an identical post from the same IP, and a board-wide pause for an
/// identical body from anyone.
pub fn default_rules(
    flood_time_secs: i64,
    flood_time_ip_secs: i64,
    flood_time_same_secs: i64,
    message: &str,
) -> Vec<FilterRule> {
    vec![
        FilterRule {
            conditions: vec![FilterCondition::FloodMatch {
                fields: vec![FloodField::Ip],
                window_secs: flood_time_secs,
                min_count: 1,
            }],
            action: FilterAction::Reject { message: message.to_string() },
        },
        FilterRule {
            conditions: vec![FilterCondition::FloodMatch {
                fields: vec![FloodField::Ip, FloodField::Body],
                window_secs: flood_time_ip_secs,
                min_count: 1,
            }],
            action: FilterAction::Reject { message: message.to_string() },
        },
        FilterRule {
            conditions: vec![FilterCondition::FloodMatch {
                fields: vec![FloodField::Body],
                window_secs: flood_time_same_secs,
                min_count: 1,
            }],
            action: FilterAction::Reject { message: message.to_string() },
        },
    ]
}

/// Widest flood window across all rules, used to bound flood cache
/// retention.
pub fn max_flood_window_secs(rules: &[FilterRule]) -> i64 {
    fn window_of(cond: &FilterCondition) -> i64 {
        match cond {
            FilterCondition::FloodMatch { window_secs, .. } => *window_secs,
            FilterCondition::Negated(inner) => window_of(inner),
            _ => 0,
        }
    }
    rules
        .iter()
        .flat_map(|r| r.conditions.iter().map(window_of))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostCandidate;

    fn candidate(ip: &str, body: &str) -> PostCandidate {
        PostCandidate {
            board: "b".to_string(),
            thread: None,
            ip: ip.to_string(),
            name: String::new(),
            email: String::new(),
            subject: String::new(),
            body: body.to_string(),
            files: Vec::new(),
            moderator: false,
        }
    }

    #[test]
    fn scope_key_depends_on_selected_fields_only() {
        let a = candidate("1.2.3.4", "hello");
        let b = candidate("1.2.3.4", "different body");
        let fields = [FloodField::Ip];
        assert_eq!(
            flood_scope_key(&fields, &a, None),
            flood_scope_key(&fields, &b, None)
        );
    }

    #[test]
    fn scope_key_differs_per_field_set() {
        let c = candidate("1.2.3.4", "hello");
        let by_ip = flood_scope_key(&[FloodField::Ip], &c, None);
        let by_ip_body = flood_scope_key(&[FloodField::Ip, FloodField::Body], &c, None);
        assert_ne!(by_ip, by_ip_body);
    }

    #[test]
    fn default_rules_cover_the_three_classic_windows() {
        let rules = default_rules(10, 120, 30, "Flood detected; wait before posting again.");
        assert_eq!(rules.len(), 3);
        assert_eq!(max_flood_window_secs(&rules), 120);
    }

    #[test]
    fn rules_round_trip_through_json() {
        let mut rules = default_rules(10, 120, 30, "flood");
        rules.push(FilterRule {
            conditions: vec![
                FilterCondition::Negated(Box::new(FilterCondition::EmptyBody)),
                FilterCondition::Custom("tripcode_spam".to_string()),
                FilterCondition::FieldRegex {
                    field: TextField::Name,
                    pattern: "^admin$".to_string(),
                },
            ],
            action: FilterAction::Ban {
                message: "banned".to_string(),
                reason: "impersonation".to_string(),
                duration_secs: Some(3600),
            },
        });
        let json = serde_json::to_string(&rules).unwrap();
        let back: Vec<FilterRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), rules.len());
        let last = back.last().unwrap();
        assert_eq!(last.conditions.len(), 3);
        assert!(matches!(
            &last.conditions[0],
            FilterCondition::Negated(inner) if matches!(**inner, FilterCondition::EmptyBody)
        ));
        assert!(matches!(
            &last.conditions[1],
            FilterCondition::Custom(name) if name == "tripcode_spam"
        ));
    }
}
