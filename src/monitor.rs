//! Operational health reporting.

use std::time::Instant;

use serde::Serialize;
use tracing::warn;

use crate::store::{AssignmentStore, Database};

/// Health status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum HealthStatus {
    Operational,
    Degraded,
}

/// A point-in-time health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    /// Datastore round-trip latency in milliseconds; absent when the
    /// probe itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_latency_ms: Option<f64>,
    pub profiles_processed: i64,
}

/// Get hostname
pub fn get_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Probes the datastore and tracks process uptime.
#[derive(Clone)]
pub struct HealthMonitor {
    start_time: Instant,
    db: Database,
    assignments: AssignmentStore,
}

impl HealthMonitor {
    pub fn new(db: Database) -> Self {
        let assignments = AssignmentStore::new(db.clone());
        Self {
            start_time: Instant::now(),
            db,
            assignments,
        }
    }

    /// Run the health probes. A failed datastore probe degrades the
    /// report instead of erroring, so the endpoint stays reachable
    /// when the datastore is down.
    pub fn check(&self) -> HealthReport {
        let uptime_secs = self.start_time.elapsed().as_secs();

        let db_latency_ms = match self.db.ping() {
            Ok(latency) => Some(latency.as_secs_f64() * 1000.0),
            Err(err) => {
                warn!("health probe failed: {}", err.format_for_log());
                None
            }
        };

        let profiles_processed = self.assignments.total_count().unwrap_or(0);

        let status = if db_latency_ms.is_some() {
            HealthStatus::Operational
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            uptime_secs,
            db_latency_ms,
            profiles_processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AssignmentMethod;

    #[test]
    fn test_healthy_report() {
        let db = Database::open_in_memory().unwrap();
        let monitor = HealthMonitor::new(db.clone());

        AssignmentStore::new(db)
            .apply("CUST-1", &["GCC_GENERIC_00".into()], AssignmentMethod::Auto)
            .unwrap();

        let report = monitor.check();
        assert_eq!(report.status, HealthStatus::Operational);
        assert!(report.db_latency_ms.is_some());
        assert_eq!(report.profiles_processed, 1);
    }

    #[test]
    fn test_status_serializes_pascal_case() {
        let json = serde_json::to_string(&HealthStatus::Operational).unwrap();
        assert_eq!(json, "\"Operational\"");
    }

    #[test]
    fn test_empty_datastore_counts_zero() {
        let monitor = HealthMonitor::new(Database::open_in_memory().unwrap());
        assert_eq!(monitor.check().profiles_processed, 0);
    }
}
