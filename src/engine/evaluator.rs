//! The evaluation entry point.

use tracing::debug;

use crate::error::Result;

use super::rules::load_rules;
use super::types::{ConfigSnapshot, ProfileInput, FALLBACK_PERSONA_ID};

/// Classify a profile into persona identifiers.
///
/// Pure and deterministic: the same input and snapshot always produce the
/// same persona set. Validation runs first; no rule is consulted for an
/// invalid input. Rules are not mutually exclusive, so zero, one, or
/// several personas may be emitted; when none match, the single fallback
/// persona is emitted instead so the result is never empty.
pub fn evaluate(profile: &ProfileInput, snapshot: &ConfigSnapshot) -> Result<Vec<String>> {
    profile.validate()?;

    let rules = load_rules(snapshot);
    let mut matched: Vec<String> = Vec::new();

    for rule in &rules {
        if rule.matches(profile, snapshot) && !matched.contains(&rule.persona_id) {
            matched.push(rule.persona_id.clone());
        }
    }

    if matched.is_empty() {
        matched.push(FALLBACK_PERSONA_ID.to_string());
    }

    debug!(personas = ?matched, "Rule evaluation complete");
    Ok(matched)
}
