//! Endpoint logic behind the HTTP router.
//!
//! Handlers stay synchronous: every operation is a datastore
//! round-trip, and audit writes go through the fire-and-forget
//! channel so nothing here awaits the audit trail.

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::info;

use crate::engine::{self, AssignmentMethod, ProfileInput};
use crate::error::Result;
use crate::store::{AuditAction, AuditEntry};

use super::routes::parse_audit_query;
use super::wire::*;
use super::AppState;

const DEFAULT_OBJECTION_REASON: &str = "Customer Request";

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// POST /profiles/{profileId}/assign-personas
pub fn assign_personas(
    state: &AppState,
    profile_id: &str,
    input: ProfileInput,
) -> Result<AssignResponse> {
    let snapshot = state.config_store.snapshot()?;
    let personas = engine::evaluate(&input, &snapshot)?;

    state
        .assignments
        .apply(profile_id, &personas, AssignmentMethod::Auto)?;

    state.audit.record(AuditEntry::new(
        AuditAction::Assigned,
        Some(profile_id.to_string()),
        json!({
            "assignedPersonas": personas,
            "input": input,
        }),
        &state.system_actor,
        None,
    ));

    info!(profile_id, personas = ?personas, "personas assigned");

    Ok(AssignResponse {
        success: true,
        profile_id: profile_id.to_string(),
        assigned_personas: personas,
        timestamp: now_timestamp(),
    })
}

/// GET /configuration
pub fn get_configuration(state: &AppState) -> Result<ConfigurationDump> {
    let (parameters, lists, maps) = state.config_store.dump()?;
    Ok(ConfigurationDump {
        parameters,
        lists,
        maps,
    })
}

/// POST /parameters
pub fn upsert_parameter(
    state: &AppState,
    req: UpsertParameterRequest,
    changed_by: &str,
) -> Result<SuccessResponse> {
    let data_type = req.data_type.as_deref().unwrap_or("string");
    state
        .config_store
        .upsert_parameter(&req.key, &req.value, data_type)?;

    state.audit.record(AuditEntry::new(
        AuditAction::UpdateParam,
        None,
        json!({ "key": req.key, "value": req.value, "type": data_type }),
        changed_by,
        req.reason,
    ));

    Ok(SuccessResponse::ok())
}

/// POST /lists
pub fn upsert_list(
    state: &AppState,
    req: UpsertListRequest,
    changed_by: &str,
) -> Result<SuccessResponse> {
    state.config_store.upsert_list(&req.key, &req.values)?;

    state.audit.record(AuditEntry::new(
        AuditAction::UpdateList,
        None,
        json!({ "key": req.key, "values": req.values }),
        changed_by,
        req.reason,
    ));

    Ok(SuccessResponse::ok())
}

/// POST /maps
pub fn upsert_map(
    state: &AppState,
    req: UpsertMapRequest,
    changed_by: &str,
) -> Result<SuccessResponse> {
    state
        .config_store
        .upsert_map(&req.map_key, &req.lookup_key, &req.value)?;

    state.audit.record(AuditEntry::new(
        AuditAction::UpdateMap,
        None,
        json!({ "mapKey": req.map_key, "lookupKey": req.lookup_key, "value": req.value }),
        changed_by,
        req.reason,
    ));

    Ok(SuccessResponse::ok())
}

/// GET /profiles/{profileId}
pub fn get_profile(state: &AppState, profile_id: &str) -> Result<ProfileDetailResponse> {
    let personas = state.assignments.list_for_profile(profile_id)?;
    let logs = state.audit_store.recent_for_profile(profile_id)?;

    Ok(ProfileDetailResponse {
        profile_id: profile_id.to_string(),
        personas,
        logs,
    })
}

/// GET /audit-logs
pub fn query_audit_logs(
    state: &AppState,
    query: Option<&str>,
) -> Result<Vec<crate::store::AuditEntry>> {
    let filter = parse_audit_query(query);
    state.audit_store.query(&filter)
}

/// DELETE /profiles/{profileId}/personas
pub fn right_to_object(
    state: &AppState,
    profile_id: &str,
    req: RightToObjectRequest,
    changed_by: &str,
) -> Result<DeletionResponse> {
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OBJECTION_REASON.to_string());

    let removed = state.assignments.remove_all(profile_id)?;

    state.audit.record(AuditEntry::new(
        AuditAction::RightToObject,
        Some(profile_id.to_string()),
        json!({ "removedAssignments": removed }),
        changed_by,
        Some(reason),
    ));

    info!(profile_id, removed, "right-to-object deletion");

    Ok(DeletionResponse {
        success: true,
        message: format!("Removed {removed} persona assignment(s) for profile {profile_id}"),
    })
}

/// GET /health. Returns whether the probe passed alongside the
/// report; a failed probe surfaces as 500 with the degraded body.
pub fn health(state: &AppState) -> (bool, HealthResponse) {
    let report = state.monitor.check();
    let healthy = report.db_latency_ms.is_some();
    (healthy, report.into())
}

/// GET /available-personas
pub fn available_personas(state: &AppState) -> Result<Vec<PersonaCountResponse>> {
    Ok(state
        .aggregator
        .list_personas()?
        .into_iter()
        .map(Into::into)
        .collect())
}

/// POST /audience-stats
pub fn audience_stats(
    state: &AppState,
    req: AudienceStatsRequest,
) -> Result<AudienceStatsResponse> {
    state
        .aggregator
        .audience_stats(&req.persona_ids)
        .map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::{AuditQuery, Database};

    fn state() -> AppState {
        AppState::new(
            &EngineConfig::default(),
            Database::open_in_memory().unwrap(),
        )
    }

    fn consenting_profile() -> ProfileInput {
        serde_json::from_value(serde_json::json!({
            "nationality": "SA",
            "age": 30,
            "income": 50000.0,
            "gender": "Female",
            "consent": true
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_assign_personas_end_to_end() {
        let state = state();

        let response = assign_personas(&state, "CUST-1", consenting_profile()).unwrap();
        assert!(response.success);
        assert_eq!(
            response.assigned_personas,
            ["GCC_NAT_MILL_01", "GCC_FEMALE_LEADER_05"]
        );

        // Assignments are durable
        let rows = state.assignments.list_for_profile("CUST-1").unwrap();
        assert_eq!(rows.len(), 2);

        // Audit entry lands after a flush
        state.audit.flush().await;
        let logs = state.audit_store.recent_for_profile("CUST-1").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "ASSIGNED");
        assert_eq!(logs[0].changed_by, "SYSTEM");
    }

    #[tokio::test]
    async fn test_assign_rejects_withheld_consent() {
        let state = state();
        let input: ProfileInput = serde_json::from_value(serde_json::json!({
            "nationality": "SA",
            "age": 30,
            "income": 50000.0,
            "consent": false
        }))
        .unwrap();

        let err = assign_personas(&state, "CUST-1", input).unwrap_err();
        assert!(err.is_client_error());
        assert!(state.assignments.list_for_profile("CUST-1").unwrap().is_empty());

        // No audit entry either: validation fails before any write
        state.audit.flush().await;
        assert!(state.audit_store.recent_for_profile("CUST-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configuration_upserts_are_audited() {
        let state = state();

        upsert_parameter(
            &state,
            UpsertParameterRequest {
                key: "AGE_MIN_MILL".into(),
                value: "28".into(),
                data_type: Some("integer".into()),
                reason: Some("Marketing review".into()),
            },
            "ops@example.com",
        )
        .unwrap();

        state.audit.flush().await;
        let logs = state
            .audit_store
            .query(&AuditQuery {
                action: Some("UPDATE_PARAM".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].changed_by, "ops@example.com");
        assert_eq!(logs[0].reason.as_deref(), Some("Marketing review"));

        // The new value is live for the next evaluation
        let snapshot = state.config_store.snapshot().unwrap();
        assert_eq!(snapshot.numeric_parameter("AGE_MIN_MILL"), Some(28.0));
    }

    #[tokio::test]
    async fn test_right_to_object_defaults_reason() {
        let state = state();
        assign_personas(&state, "CUST-1", consenting_profile()).unwrap();

        let response =
            right_to_object(&state, "CUST-1", RightToObjectRequest::default(), "ADMIN").unwrap();
        assert!(response.success);
        assert!(state.assignments.list_for_profile("CUST-1").unwrap().is_empty());

        state.audit.flush().await;
        let logs = state
            .audit_store
            .query(&AuditQuery {
                action: Some("RIGHT_TO_OBJECT".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].reason.as_deref(), Some("Customer Request"));
        assert_eq!(logs[0].details["removedAssignments"], 2);
    }

    #[tokio::test]
    async fn test_assignment_survives_broken_audit_trail() {
        let db = Database::open_in_memory().unwrap();
        let state = AppState::new(&EngineConfig::default(), db.clone());

        // Break only the audit trail; assignments stay intact.
        db.with_conn(|conn| conn.execute_batch("DROP TABLE audit_log"))
            .unwrap();

        let response = assign_personas(&state, "CUST-1", consenting_profile()).unwrap();
        assert!(response.success);
        assert_eq!(state.assignments.list_for_profile("CUST-1").unwrap().len(), 2);

        state.audit.flush().await;
        assert_eq!(state.audit.dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_audience_stats_rejects_empty_set() {
        let state = state();
        let err = audience_stats(
            &state,
            AudienceStatsRequest {
                persona_ids: vec![],
            },
        )
        .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_profile_detail_combines_personas_and_logs() {
        let state = state();
        assign_personas(&state, "CUST-1", consenting_profile()).unwrap();
        state.audit.flush().await;

        let detail = get_profile(&state, "CUST-1").unwrap();
        assert_eq!(detail.profile_id, "CUST-1");
        assert_eq!(detail.personas.len(), 2);
        assert_eq!(detail.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_health_reports_operational() {
        let state = state();
        let (healthy, report) = health(&state);
        assert!(healthy);
        assert_eq!(report.profiles_processed, 0);
    }
}
