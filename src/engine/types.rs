//! Core types for rule evaluation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Persona granted when no configured rule matches. Guarantees every
/// evaluated profile receives at least one persona; never combined with
/// real matches.
pub const FALLBACK_PERSONA_ID: &str = "GCC_GENERIC_00";

// ─────────────────────────────────────────────────────────────────
// Profile Input
// ─────────────────────────────────────────────────────────────────

/// Attributes of a customer profile, supplied per evaluation call by an
/// external collaborator. Not persisted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileInput {
    /// ISO country code, e.g. "SA"
    pub nationality: Option<String>,

    /// Age in years
    pub age: Option<i64>,

    /// Monthly income
    pub income: Option<f64>,

    /// Free-form gender label, e.g. "Female"
    #[serde(default)]
    pub gender: Option<String>,

    /// Evaluation may only proceed when true
    #[serde(default)]
    pub consent: bool,
}

impl ProfileInput {
    /// Reject the input unless consent was given and all mandatory
    /// fields are present. Runs before any write is attempted.
    pub fn validate(&self) -> Result<()> {
        if !self.consent {
            return Err(Error::ConsentWithheld);
        }
        if self.nationality.as_deref().map_or(true, str::is_empty) {
            return Err(Error::missing_field("nationality"));
        }
        if self.age.is_none() {
            return Err(Error::missing_field("age"));
        }
        if self.income.is_none() {
            return Err(Error::missing_field("income"));
        }
        Ok(())
    }

    /// Look up a profile field by the name rules refer to it with.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "nationality" => self.nationality.clone().map(FieldValue::Text),
            "age" => self.age.map(|a| FieldValue::Number(a as f64)),
            "income" => self.income.map(FieldValue::Number),
            "gender" => self.gender.clone().map(FieldValue::Text),
            _ => None,
        }
    }
}

/// A profile field value as seen by the rule interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Assignment Method
// ─────────────────────────────────────────────────────────────────

/// How a persona assignment came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMethod {
    /// Written by the rule evaluator
    Auto,
    /// Written through an administrative action
    Manual,
}

impl AssignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMethod::Auto => "auto",
            AssignmentMethod::Manual => "manual",
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssignmentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(AssignmentMethod::Auto),
            "manual" => Ok(AssignmentMethod::Manual),
            _ => Err(format!("Unknown assignment method '{}'. Valid: auto, manual", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Configuration Snapshot
// ─────────────────────────────────────────────────────────────────

/// A point-in-time copy of the full parameter/list/map set.
///
/// Loaded once per evaluation call so a single evaluation sees a
/// consistent configuration even while an administrator tunes values
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub parameters: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
    pub maps: HashMap<String, HashMap<String, String>>,
}

impl ConfigSnapshot {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Parameter parsed as a number; None when absent or non-numeric.
    pub fn numeric_parameter(&self, key: &str) -> Option<f64> {
        self.parameter(key)?.parse().ok()
    }

    /// Membership list for a key; empty slice when absent.
    pub fn list(&self, key: &str) -> &[String] {
        self.lists.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn map_entry(&self, map_key: &str, lookup_key: &str) -> Option<&str> {
        self.maps.get(map_key)?.get(lookup_key).map(String::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> ProfileInput {
        ProfileInput {
            nationality: Some("SA".to_string()),
            age: Some(30),
            income: Some(25000.0),
            gender: Some("Female".to_string()),
            consent: true,
        }
    }

    #[test]
    fn test_validate_accepts_complete_input() {
        assert!(full_input().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_withheld_consent() {
        let mut input = full_input();
        input.consent = false;
        assert!(matches!(input.validate(), Err(Error::ConsentWithheld)));
    }

    #[test]
    fn test_validate_rejects_missing_mandatory_fields() {
        for field in ["nationality", "age", "income"] {
            let mut input = full_input();
            match field {
                "nationality" => input.nationality = None,
                "age" => input.age = None,
                _ => input.income = None,
            }
            match input.validate() {
                Err(Error::MissingField { field: f }) => assert_eq!(f, field),
                other => panic!("Expected MissingField for {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_validate_rejects_empty_nationality() {
        let mut input = full_input();
        input.nationality = Some(String::new());
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_gender_is_optional() {
        let mut input = full_input();
        input.gender = None;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_field_lookup() {
        let input = full_input();
        assert_eq!(
            input.field("nationality"),
            Some(FieldValue::Text("SA".to_string()))
        );
        assert_eq!(input.field("age"), Some(FieldValue::Number(30.0)));
        assert_eq!(input.field("unknown"), None);
    }

    #[test]
    fn test_method_roundtrip() {
        assert_eq!("auto".parse::<AssignmentMethod>().unwrap(), AssignmentMethod::Auto);
        assert_eq!("Manual".parse::<AssignmentMethod>().unwrap(), AssignmentMethod::Manual);
        assert!("robot".parse::<AssignmentMethod>().is_err());
        assert_eq!(AssignmentMethod::Auto.as_str(), "auto");
    }

    #[test]
    fn test_snapshot_lookups() {
        let mut snapshot = ConfigSnapshot::default();
        snapshot.parameters.insert("AGE_MIN_MILL".into(), "25".into());
        snapshot.lists.insert("COUNTRIES_NAT_MILL".into(), vec!["SA".into()]);
        snapshot
            .maps
            .entry("TIER".into())
            .or_default()
            .insert("SA".into(), "gold".into());

        assert_eq!(snapshot.numeric_parameter("AGE_MIN_MILL"), Some(25.0));
        assert_eq!(snapshot.numeric_parameter("MISSING"), None);
        assert_eq!(snapshot.list("COUNTRIES_NAT_MILL"), ["SA".to_string()]);
        assert!(snapshot.list("MISSING").is_empty());
        assert_eq!(snapshot.map_entry("TIER", "SA"), Some("gold"));
        assert_eq!(snapshot.map_entry("TIER", "US"), None);
    }
}
