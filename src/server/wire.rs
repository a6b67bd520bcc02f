//! JSON request and response shapes for the HTTP surface.
//!
//! Field naming follows the established wire contract (camelCase on
//! the profile/configuration endpoints, snake_case on the audience
//! endpoints) rather than one uniform convention.

use serde::{Deserialize, Serialize};

use crate::aggregate::{AudienceStats, PersonaCount};
use crate::monitor::{HealthReport, HealthStatus};
use crate::store::{AssignmentRow, AuditEntry, ListRow, MapRow, ParameterRow};

// ─────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpsertParameterRequest {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertListRequest {
    pub key: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertMapRequest {
    #[serde(rename = "mapKey")]
    pub map_key: String,
    #[serde(rename = "lookupKey")]
    pub lookup_key: String,
    pub value: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RightToObjectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudienceStatsRequest {
    #[serde(default)]
    pub persona_ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub success: bool,
    #[serde(rename = "profileId")]
    pub profile_id: String,
    #[serde(rename = "assignedPersonas")]
    pub assigned_personas: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigurationDump {
    pub parameters: Vec<ParameterRow>,
    pub lists: Vec<ListRow>,
    pub maps: Vec<MapRow>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileDetailResponse {
    #[serde(rename = "profileId")]
    pub profile_id: String,
    pub personas: Vec<AssignmentRow>,
    pub logs: Vec<AuditEntry>,
}

#[derive(Debug, Serialize)]
pub struct DeletionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub uptime: u64,
    #[serde(rename = "dbLatency", skip_serializing_if = "Option::is_none")]
    pub db_latency: Option<f64>,
    #[serde(rename = "profilesProcessed")]
    pub profiles_processed: i64,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            status: report.status,
            uptime: report.uptime_secs,
            db_latency: report.db_latency_ms,
            profiles_processed: report.profiles_processed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PersonaCountResponse {
    pub id: String,
    pub count: i64,
}

impl From<PersonaCount> for PersonaCountResponse {
    fn from(p: PersonaCount) -> Self {
        Self {
            id: p.id,
            count: p.count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AudienceStatsResponse {
    pub total_customers: i64,
    pub avg_ltv: f64,
    pub engagement_rate: f64,
}

impl From<AudienceStats> for AudienceStatsResponse {
    fn from(s: AudienceStats) -> Self {
        Self {
            total_customers: s.total_customers,
            avg_ltv: s.avg_ltv,
            engagement_rate: s.engagement_rate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assign_response_field_names() {
        let body = serde_json::to_value(AssignResponse {
            success: true,
            profile_id: "CUST-1".into(),
            assigned_personas: vec!["GCC_GENERIC_00".into()],
            timestamp: "2025-01-01T00:00:00.000Z".into(),
        })
        .unwrap();

        assert_eq!(body["profileId"], "CUST-1");
        assert_eq!(body["assignedPersonas"][0], "GCC_GENERIC_00");
    }

    #[test]
    fn test_map_request_camel_case() {
        let req: UpsertMapRequest = serde_json::from_value(json!({
            "mapKey": "TIERS",
            "lookupKey": "SA",
            "value": "gold"
        }))
        .unwrap();
        assert_eq!(req.map_key, "TIERS");
        assert_eq!(req.lookup_key, "SA");
        assert!(req.reason.is_none());
    }

    #[test]
    fn test_parameter_request_type_field() {
        let req: UpsertParameterRequest = serde_json::from_value(json!({
            "key": "AGE_MIN_MILL",
            "value": "30",
            "type": "integer"
        }))
        .unwrap();
        assert_eq!(req.data_type.as_deref(), Some("integer"));
    }

    #[test]
    fn test_audience_stats_request_defaults_empty() {
        let req: AudienceStatsRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.persona_ids.is_empty());
    }

    #[test]
    fn test_health_response_field_names() {
        let body = serde_json::to_value(HealthResponse {
            status: HealthStatus::Operational,
            uptime: 42,
            db_latency: Some(0.5),
            profiles_processed: 7,
        })
        .unwrap();

        assert_eq!(body["status"], "Operational");
        assert_eq!(body["uptime"], 42);
        assert_eq!(body["dbLatency"], 0.5);
        assert_eq!(body["profilesProcessed"], 7);
    }
}
