//! Audience aggregation over the assignment table.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::Database;

/// Fixed placeholder pending a real event-based computation.
pub const ENGAGEMENT_RATE_PLACEHOLDER: f64 = 0.75;

/// One persona with its audience size.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaCount {
    pub id: String,
    pub count: i64,
}

/// Aggregate stats for a persona set.
#[derive(Debug, Clone, Serialize)]
pub struct AudienceStats {
    pub total_customers: i64,
    pub avg_ltv: f64,
    pub engagement_rate: f64,
}

/// Read-only aggregation queries over assignments and the CRM-owned
/// customer profile table.
#[derive(Clone)]
pub struct AudienceAggregator {
    db: Database,
}

impl AudienceAggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every persona currently represented in assignments with its
    /// distinct-profile count, most popular first.
    pub fn list_personas(&self) -> Result<Vec<PersonaCount>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT persona_id, COUNT(DISTINCT profile_id) AS profiles
                 FROM assignments
                 GROUP BY persona_id
                 ORDER BY profiles DESC, persona_id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PersonaCount {
                        id: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect();
            rows
        })
    }

    /// Aggregate stats for the profiles assigned to any of the given
    /// personas. An empty persona set is a client error.
    pub fn audience_stats(&self, persona_ids: &[String]) -> Result<AudienceStats> {
        if persona_ids.is_empty() {
            return Err(Error::EmptyPersonaSet);
        }

        let placeholders = vec!["?"; persona_ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(AVG(COALESCE(cp.lifetime_value, 0)), 0)
             FROM (SELECT DISTINCT profile_id FROM assignments
                   WHERE persona_id IN ({placeholders})) a
             LEFT JOIN customer_profiles cp ON cp.profile_id = a.profile_id"
        );

        let (total_customers, avg_ltv) = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let args: Vec<&dyn rusqlite::ToSql> =
                persona_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
            stmt.query_row(&args[..], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })
        })?;

        Ok(AudienceStats {
            total_customers,
            avg_ltv,
            engagement_rate: ENGAGEMENT_RATE_PLACEHOLDER,
        })
    }
}
