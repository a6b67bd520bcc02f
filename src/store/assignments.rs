//! Persistence for profile-to-persona assignments.
//!
//! `apply()` writes the full persona set for one profile inside a
//! single transaction, so a partial write can never become visible.
//! Re-applying the same set refreshes `assigned_at` without creating
//! duplicate rows.

use rusqlite::params;
use serde::Serialize;

use crate::engine::AssignmentMethod;
use crate::error::Result;

use super::db::{now_rfc3339, Database};

/// One stored assignment.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentRow {
    pub profile_id: String,
    pub persona_id: String,
    pub assigned_at: String,
    pub method: String,
    pub score: f64,
}

/// Store for persona assignments.
#[derive(Clone)]
pub struct AssignmentStore {
    db: Database,
}

impl AssignmentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Apply a persona set to a profile atomically.
    ///
    /// Either every persona in the set is recorded or none of them
    /// are. Existing (profile, persona) rows are refreshed in place;
    /// their score is left untouched.
    pub fn apply(
        &self,
        profile_id: &str,
        persona_ids: &[String],
        method: AssignmentMethod,
    ) -> Result<()> {
        let now = now_rfc3339();

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO assignments (profile_id, persona_id, assigned_at, method)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(profile_id, persona_id) DO UPDATE SET
                         assigned_at = excluded.assigned_at,
                         method = excluded.method",
                )?;
                for persona_id in persona_ids {
                    stmt.execute(params![profile_id, persona_id, now, method.as_str()])?;
                }
            }
            tx.commit()
        })
    }

    /// All personas currently assigned to a profile, newest first.
    pub fn list_for_profile(&self, profile_id: &str) -> Result<Vec<AssignmentRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT profile_id, persona_id, assigned_at, method, score
                 FROM assignments
                 WHERE profile_id = ?1
                 ORDER BY assigned_at DESC, persona_id",
            )?;
            let rows = stmt
                .query_map(params![profile_id], |row| {
                    Ok(AssignmentRow {
                        profile_id: row.get(0)?,
                        persona_id: row.get(1)?,
                        assigned_at: row.get(2)?,
                        method: row.get(3)?,
                        score: row.get(4)?,
                    })
                })?
                .collect();
            rows
        })
    }

    /// Delete every assignment for a profile; returns how many rows
    /// were removed.
    pub fn remove_all(&self, profile_id: &str) -> Result<usize> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM assignments WHERE profile_id = ?1",
                params![profile_id],
            )
        })
    }

    /// Total number of assignment rows.
    pub fn total_count(&self) -> Result<i64> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM assignments", [], |row| row.get(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AssignmentStore {
        AssignmentStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_apply_writes_every_persona() {
        let store = store();

        store
            .apply(
                "CUST-1",
                &["GCC_NAT_MILL_01".into(), "GCC_FEMALE_LEADER_05".into()],
                AssignmentMethod::Auto,
            )
            .unwrap();

        let rows = store.list_for_profile("CUST-1").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.method == "auto"));
        assert!(rows.iter().all(|r| (r.score - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_reapply_does_not_duplicate() {
        let store = store();
        let personas = vec!["GCC_NAT_MILL_01".to_string()];

        store.apply("CUST-1", &personas, AssignmentMethod::Auto).unwrap();
        store.apply("CUST-1", &personas, AssignmentMethod::Auto).unwrap();
        store.apply("CUST-1", &personas, AssignmentMethod::Auto).unwrap();

        assert_eq!(store.list_for_profile("CUST-1").unwrap().len(), 1);
        assert_eq!(store.total_count().unwrap(), 1);
    }

    #[test]
    fn test_apply_is_atomic_on_failure() {
        let store = store();

        // The second persona violates the non-empty CHECK constraint,
        // so the whole batch must roll back.
        let result = store.apply(
            "CUST-1",
            &["GCC_NAT_MILL_01".into(), "".into()],
            AssignmentMethod::Auto,
        );
        assert!(result.is_err());
        assert!(store.list_for_profile("CUST-1").unwrap().is_empty());
    }

    #[test]
    fn test_remove_all_reports_row_count() {
        let store = store();
        store
            .apply(
                "CUST-1",
                &["GCC_NAT_MILL_01".into(), "GCC_FEMALE_LEADER_05".into()],
                AssignmentMethod::Auto,
            )
            .unwrap();
        store
            .apply("CUST-2", &["GCC_GENERIC_00".into()], AssignmentMethod::Auto)
            .unwrap();

        assert_eq!(store.remove_all("CUST-1").unwrap(), 2);
        assert!(store.list_for_profile("CUST-1").unwrap().is_empty());

        // Other profiles are untouched
        assert_eq!(store.list_for_profile("CUST-2").unwrap().len(), 1);

        // Removing again is a no-op
        assert_eq!(store.remove_all("CUST-1").unwrap(), 0);
    }

    #[test]
    fn test_reapply_updates_row_in_place() {
        let store = store();
        let personas = vec!["GCC_GENERIC_00".to_string()];

        store.apply("CUST-1", &personas, AssignmentMethod::Auto).unwrap();
        store.apply("CUST-1", &personas, AssignmentMethod::Manual).unwrap();

        // The conflict path updated the existing row rather than
        // inserting a second one
        let rows = store.list_for_profile("CUST-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].method, "manual");
    }
}
