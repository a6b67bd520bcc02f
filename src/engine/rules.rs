//! Declarative rule set.
//!
//! Rules are data: an ordered list of persona rules, each a condition tree
//! over named profile fields whose operands resolve from the configuration
//! snapshot. New personas are added by upserting the `PERSONA_RULES`
//! parameter (a JSON rule set) rather than redeploying code; when that
//! parameter is absent the built-in default set applies.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{ConfigSnapshot, FieldValue, ProfileInput};

/// Parameter key holding an operator-supplied JSON rule set.
pub const RULES_PARAMETER_KEY: &str = "PERSONA_RULES";

// ─────────────────────────────────────────────────────────────────
// Rule
// ─────────────────────────────────────────────────────────────────

/// One persona rule: when the condition holds, the persona is emitted.
/// Rules are not mutually exclusive; every matching rule contributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Persona identifier emitted on match, e.g. "GCC_NAT_MILL_01"
    pub persona_id: String,

    /// Condition tree over profile fields
    pub condition: Condition,
}

impl Rule {
    pub fn matches(&self, profile: &ProfileInput, snapshot: &ConfigSnapshot) -> bool {
        self.condition.holds(profile, snapshot)
    }
}

// ─────────────────────────────────────────────────────────────────
// Condition
// ─────────────────────────────────────────────────────────────────

/// A condition over profile fields. Leaves resolve their bounds from the
/// parameter/list/map snapshot; an unresolvable operand makes the leaf
/// false rather than an error, so a half-configured rule simply never
/// matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Every child condition holds
    All { conditions: Vec<Condition> },

    /// At least one child condition holds
    Any { conditions: Vec<Condition> },

    /// Field equals the operand (numeric when both sides are numeric,
    /// textual otherwise)
    Equals { field: String, value: Operand },

    /// Field is strictly greater than the operand
    GreaterThan { field: String, value: Operand },

    /// Field lies within [min, max], inclusive on both ends
    Between { field: String, min: Operand, max: Operand },

    /// Field is a member of the named list (exact string equality)
    InList { field: String, list: String },
}

impl Condition {
    pub fn holds(&self, profile: &ProfileInput, snapshot: &ConfigSnapshot) -> bool {
        match self {
            Condition::All { conditions } => {
                conditions.iter().all(|c| c.holds(profile, snapshot))
            }
            Condition::Any { conditions } => {
                conditions.iter().any(|c| c.holds(profile, snapshot))
            }
            Condition::Equals { field, value } => {
                match (profile.field(field), value.resolve(snapshot)) {
                    (Some(actual), Some(expected)) => {
                        match (actual.as_number(), expected.as_number()) {
                            (Some(a), Some(b)) => a == b,
                            _ => actual.as_text() == expected.as_text(),
                        }
                    }
                    _ => false,
                }
            }
            Condition::GreaterThan { field, value } => {
                match (
                    profile.field(field).and_then(|v| v.as_number()),
                    value.resolve(snapshot).and_then(|v| v.as_number()),
                ) {
                    (Some(actual), Some(bound)) => actual > bound,
                    _ => false,
                }
            }
            Condition::Between { field, min, max } => {
                let actual = profile.field(field).and_then(|v| v.as_number());
                let lo = min.resolve(snapshot).and_then(|v| v.as_number());
                let hi = max.resolve(snapshot).and_then(|v| v.as_number());
                match (actual, lo, hi) {
                    (Some(a), Some(lo), Some(hi)) => a >= lo && a <= hi,
                    _ => false,
                }
            }
            Condition::InList { field, list } => match profile.field(field) {
                Some(actual) => {
                    let needle = actual.as_text();
                    snapshot.list(list).iter().any(|v| *v == needle)
                }
                None => false,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Operand
// ─────────────────────────────────────────────────────────────────

/// Where a condition leaf gets its comparison value from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Operand {
    /// A fixed value embedded in the rule itself
    Literal { value: serde_json::Value },

    /// A named parameter from the snapshot
    Parameter { key: String },

    /// A two-level map lookup from the snapshot
    MapEntry { map_key: String, lookup_key: String },
}

impl Operand {
    fn resolve(&self, snapshot: &ConfigSnapshot) -> Option<FieldValue> {
        match self {
            Operand::Literal { value } => match value {
                serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
                serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number),
                _ => None,
            },
            Operand::Parameter { key } => {
                snapshot.parameter(key).map(|v| FieldValue::Text(v.to_string()))
            }
            Operand::MapEntry { map_key, lookup_key } => snapshot
                .map_entry(map_key, lookup_key)
                .map(|v| FieldValue::Text(v.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Rule set loading
// ─────────────────────────────────────────────────────────────────

/// The built-in rule set, expressing the two reference rules.
pub fn default_rules() -> Vec<Rule> {
    vec![
        // Millennial nationals: age within the configured band and
        // nationality on the configured country list.
        Rule {
            persona_id: "GCC_NAT_MILL_01".to_string(),
            condition: Condition::All {
                conditions: vec![
                    Condition::Between {
                        field: "age".to_string(),
                        min: Operand::Parameter { key: "AGE_MIN_MILL".to_string() },
                        max: Operand::Parameter { key: "AGE_MAX_MILL".to_string() },
                    },
                    Condition::InList {
                        field: "nationality".to_string(),
                        list: "COUNTRIES_NAT_MILL".to_string(),
                    },
                ],
            },
        },
        // Female leaders: gender label plus income threshold.
        Rule {
            persona_id: "GCC_FEMALE_LEADER_05".to_string(),
            condition: Condition::All {
                conditions: vec![
                    Condition::Equals {
                        field: "gender".to_string(),
                        value: Operand::Literal { value: serde_json::json!("Female") },
                    },
                    Condition::GreaterThan {
                        field: "income".to_string(),
                        value: Operand::Parameter { key: "INCOME_MIN_LEADER".to_string() },
                    },
                ],
            },
        },
    ]
}

/// Load the active rule set from the snapshot, falling back to the
/// built-in defaults when no `PERSONA_RULES` parameter is configured or
/// the configured one does not parse.
pub fn load_rules(snapshot: &ConfigSnapshot) -> Vec<Rule> {
    match snapshot.parameter(RULES_PARAMETER_KEY) {
        Some(json) => match serde_json::from_str::<Vec<Rule>>(json) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Configured PERSONA_RULES is invalid, using default rule set");
                default_rules()
            }
        },
        None => default_rules(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
