//! Audit trail persistence and querying.

use rusqlite::params;
use serde::Serialize;

use crate::error::Result;

use super::db::{now_rfc3339, Database};

/// Maximum rows returned by a single audit query.
const QUERY_LIMIT: usize = 100;

/// The auditable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Assigned,
    UpdateParam,
    UpdateList,
    UpdateMap,
    RightToObject,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Assigned => "ASSIGNED",
            AuditAction::UpdateParam => "UPDATE_PARAM",
            AuditAction::UpdateList => "UPDATE_LIST",
            AuditAction::UpdateMap => "UPDATE_MAP",
            AuditAction::RightToObject => "RIGHT_TO_OBJECT",
        }
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub profile_id: Option<String>,
    pub action: String,
    pub details: serde_json::Value,
    pub changed_by: String,
    pub reason: Option<String>,
    pub timestamp: String,
}

impl AuditEntry {
    /// Build an entry stamped with the current time.
    pub fn new(
        action: AuditAction,
        profile_id: Option<String>,
        details: serde_json::Value,
        changed_by: impl Into<String>,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: None,
            profile_id,
            action: action.as_str().to_string(),
            details,
            changed_by: changed_by.into(),
            reason,
            timestamp: now_rfc3339(),
        }
    }
}

/// Filters for the audit query surface. All present filters are
/// AND-combined.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub profile_id: Option<String>,
    pub action: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
}

/// Store for the audit trail.
#[derive(Clone)]
pub struct AuditStore {
    db: Database,
}

impl AuditStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, entry: &AuditEntry) -> Result<()> {
        let details = entry.details.to_string();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_log (profile_id, action, details, changed_by, reason, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.profile_id,
                    entry.action,
                    details,
                    entry.changed_by,
                    entry.reason,
                    entry.timestamp,
                ],
            )
            .map(|_| ())
        })
    }

    /// Query entries matching every present filter, newest first,
    /// capped at 100 rows.
    pub fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let mut sql = String::from(
            "SELECT id, profile_id, action, details, changed_by, reason, timestamp
             FROM audit_log WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(profile_id) = &filter.profile_id {
            sql.push_str(" AND profile_id = ?");
            args.push(Box::new(profile_id.clone()));
        }
        if let Some(action) = &filter.action {
            sql.push_str(" AND action = ?");
            args.push(Box::new(action.clone()));
        }
        if let Some(start) = &filter.date_start {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(start.clone()));
        }
        if let Some(end) = &filter.date_end {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(end_of_day(end)));
        }

        sql.push_str(&format!(
            " ORDER BY timestamp DESC, id DESC LIMIT {QUERY_LIMIT}"
        ));

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let args: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
            let rows = stmt.query_map(&args[..], row_to_entry)?.collect();
            rows
        })
    }

    /// The most recent entries for one profile.
    pub fn recent_for_profile(&self, profile_id: &str) -> Result<Vec<AuditEntry>> {
        self.query(&AuditQuery {
            profile_id: Some(profile_id.to_string()),
            ..AuditQuery::default()
        })
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let details: String = row.get(3)?;
    Ok(AuditEntry {
        id: Some(row.get(0)?),
        profile_id: row.get(1)?,
        action: row.get(2)?,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
        changed_by: row.get(4)?,
        reason: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

/// A bare date filter (YYYY-MM-DD) on the end of a range should
/// include the whole day, not cut off at midnight.
fn end_of_day(date: &str) -> String {
    if date.len() == 10 {
        format!("{date}T23:59:59.999Z")
    } else {
        date.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> AuditStore {
        AuditStore::new(Database::open_in_memory().unwrap())
    }

    fn entry(action: AuditAction, profile_id: Option<&str>) -> AuditEntry {
        AuditEntry::new(
            action,
            profile_id.map(String::from),
            json!({}),
            "SYSTEM",
            None,
        )
    }

    #[test]
    fn test_insert_and_query_round_trip() {
        let store = store();
        store
            .insert(&AuditEntry::new(
                AuditAction::Assigned,
                Some("CUST-1".into()),
                json!({"assignedPersonas": ["GCC_GENERIC_00"]}),
                "SYSTEM",
                None,
            ))
            .unwrap();

        let rows = store.query(&AuditQuery::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "ASSIGNED");
        assert_eq!(rows[0].profile_id.as_deref(), Some("CUST-1"));
        assert_eq!(rows[0].details["assignedPersonas"][0], "GCC_GENERIC_00");
        assert!(rows[0].id.is_some());
    }

    #[test]
    fn test_filters_are_and_combined() {
        let store = store();
        store.insert(&entry(AuditAction::Assigned, Some("CUST-1"))).unwrap();
        store.insert(&entry(AuditAction::RightToObject, Some("CUST-1"))).unwrap();
        store.insert(&entry(AuditAction::Assigned, Some("CUST-2"))).unwrap();

        let rows = store
            .query(&AuditQuery {
                profile_id: Some("CUST-1".into()),
                action: Some("ASSIGNED".into()),
                ..AuditQuery::default()
            })
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].profile_id.as_deref(), Some("CUST-1"));
        assert_eq!(rows[0].action, "ASSIGNED");
    }

    #[test]
    fn test_newest_first_capped_at_limit() {
        let store = store();
        for i in 0..110 {
            let mut e = entry(AuditAction::UpdateParam, None);
            e.timestamp = format!("2025-01-01T00:00:{:02}.000Z", i % 60);
            e.details = json!({ "seq": i });
            store.insert(&e).unwrap();
        }

        let rows = store.query(&AuditQuery::default()).unwrap();
        assert_eq!(rows.len(), 100);
        // Ties on timestamp break by insertion order, newest first
        assert!(rows[0].id.unwrap() > rows[99].id.unwrap());
    }

    #[test]
    fn test_bare_end_date_includes_whole_day() {
        let store = store();
        let mut e = entry(AuditAction::Assigned, Some("CUST-1"));
        e.timestamp = "2025-06-15T18:30:00.000Z".to_string();
        store.insert(&e).unwrap();

        let rows = store
            .query(&AuditQuery {
                date_end: Some("2025-06-15".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = store
            .query(&AuditQuery {
                date_end: Some("2025-06-14".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_date_start_filter() {
        let store = store();
        let mut old = entry(AuditAction::Assigned, None);
        old.timestamp = "2024-01-01T00:00:00.000Z".to_string();
        store.insert(&old).unwrap();
        let mut new = entry(AuditAction::Assigned, None);
        new.timestamp = "2025-01-01T00:00:00.000Z".to_string();
        store.insert(&new).unwrap();

        let rows = store
            .query(&AuditQuery {
                date_start: Some("2024-06-01".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, "2025-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(AuditAction::Assigned.as_str(), "ASSIGNED");
        assert_eq!(AuditAction::UpdateParam.as_str(), "UPDATE_PARAM");
        assert_eq!(AuditAction::UpdateList.as_str(), "UPDATE_LIST");
        assert_eq!(AuditAction::UpdateMap.as_str(), "UPDATE_MAP");
        assert_eq!(AuditAction::RightToObject.as_str(), "RIGHT_TO_OBJECT");
    }
}
