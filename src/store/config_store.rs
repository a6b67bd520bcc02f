//! The configuration store: parameters, lists, and maps.
//!
//! All writes are idempotent upserts by natural key. Reads for rule
//! evaluation go through `snapshot()`, which loads the complete set in
//! one pass so an evaluation call sees a consistent configuration.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::engine::ConfigSnapshot;
use crate::error::Result;

use super::db::{now_rfc3339, Database};

/// A scalar parameter row.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterRow {
    pub key: String,
    pub value: String,
    pub data_type: String,
    pub last_updated: String,
}

/// A named ordered list of strings.
#[derive(Debug, Clone, Serialize)]
pub struct ListRow {
    pub key: String,
    pub values: Vec<String>,
    pub last_updated: String,
}

/// One entry of a two-level lookup map.
#[derive(Debug, Clone, Serialize)]
pub struct MapRow {
    pub map_key: String,
    pub lookup_key: String,
    pub value: String,
    pub last_updated: String,
}

/// Store for the three configuration primitives.
#[derive(Clone)]
pub struct ConfigStore {
    db: Database,
}

impl ConfigStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ─────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────

    pub fn get_parameter(&self, key: &str) -> Result<Option<ParameterRow>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT key, value, data_type, last_updated FROM parameters WHERE key = ?1",
                params![key],
                |row| {
                    Ok(ParameterRow {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        data_type: row.get(2)?,
                        last_updated: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Membership list for a key; empty when the key is absent.
    pub fn get_list(&self, key: &str) -> Result<Vec<String>> {
        let json: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT values_json FROM lists WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })?;

        Ok(json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default())
    }

    pub fn get_map(&self, map_key: &str, lookup_key: &str) -> Result<Option<String>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM maps WHERE map_key = ?1 AND lookup_key = ?2",
                params![map_key, lookup_key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Upserts (insert-or-replace by natural key)
    // ─────────────────────────────────────────────────────────────

    pub fn upsert_parameter(&self, key: &str, value: &str, data_type: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO parameters (key, value, data_type, last_updated)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     data_type = excluded.data_type,
                     last_updated = excluded.last_updated",
                params![key, value, data_type, now_rfc3339()],
            )
            .map(|_| ())
        })
    }

    pub fn upsert_list(&self, key: &str, values: &[String]) -> Result<()> {
        let json = serde_json::to_string(values)
            .map_err(|e| crate::error::Error::Internal(e.to_string()))?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO lists (key, values_json, last_updated)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     values_json = excluded.values_json,
                     last_updated = excluded.last_updated",
                params![key, json, now_rfc3339()],
            )
            .map(|_| ())
        })
    }

    pub fn upsert_map(&self, map_key: &str, lookup_key: &str, value: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO maps (map_key, lookup_key, value, last_updated)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(map_key, lookup_key) DO UPDATE SET
                     value = excluded.value,
                     last_updated = excluded.last_updated",
                params![map_key, lookup_key, value, now_rfc3339()],
            )
            .map(|_| ())
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Snapshot and dump
    // ─────────────────────────────────────────────────────────────

    /// Load the full parameter/list/map set in a single pass.
    pub fn snapshot(&self) -> Result<ConfigSnapshot> {
        let mut snapshot = ConfigSnapshot::default();

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM parameters")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, value) = row?;
                snapshot.parameters.insert(key, value);
            }

            let mut stmt = conn.prepare("SELECT key, values_json FROM lists")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, json) = row?;
                let values: Vec<String> = serde_json::from_str(&json).unwrap_or_default();
                snapshot.lists.insert(key, values);
            }

            let mut stmt = conn.prepare("SELECT map_key, lookup_key, value FROM maps")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (map_key, lookup_key, value) = row?;
                snapshot
                    .maps
                    .entry(map_key)
                    .or_default()
                    .insert(lookup_key, value);
            }

            Ok(())
        })?;

        Ok(snapshot)
    }

    /// Dump every configuration row, for the administrative surface.
    pub fn dump(&self) -> Result<(Vec<ParameterRow>, Vec<ListRow>, Vec<MapRow>)> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, data_type, last_updated FROM parameters ORDER BY key",
            )?;
            let parameters = stmt
                .query_map([], |row| {
                    Ok(ParameterRow {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        data_type: row.get(2)?,
                        last_updated: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt =
                conn.prepare("SELECT key, values_json, last_updated FROM lists ORDER BY key")?;
            let lists = stmt
                .query_map([], |row| {
                    let json: String = row.get(1)?;
                    Ok(ListRow {
                        key: row.get(0)?,
                        values: serde_json::from_str(&json).unwrap_or_default(),
                        last_updated: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = conn.prepare(
                "SELECT map_key, lookup_key, value, last_updated FROM maps
                 ORDER BY map_key, lookup_key",
            )?;
            let maps = stmt
                .query_map([], |row| {
                    Ok(MapRow {
                        map_key: row.get(0)?,
                        lookup_key: row.get(1)?,
                        value: row.get(2)?,
                        last_updated: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok((parameters, lists, maps))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        ConfigStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_parameter_upsert_is_idempotent_by_key() {
        let store = store();

        store.upsert_parameter("LIMIT", "10", "integer").unwrap();
        store.upsert_parameter("LIMIT", "20", "integer").unwrap();

        let row = store.get_parameter("LIMIT").unwrap().unwrap();
        assert_eq!(row.value, "20");
        assert_eq!(row.data_type, "integer");

        // Still exactly one row
        let (parameters, _, _) = store.dump().unwrap();
        assert_eq!(parameters.iter().filter(|p| p.key == "LIMIT").count(), 1);
    }

    #[test]
    fn test_absent_parameter_is_none() {
        assert!(store().get_parameter("NOPE").unwrap().is_none());
    }

    #[test]
    fn test_list_preserves_order_and_overwrites() {
        let store = store();

        store
            .upsert_list("COUNTRIES", &["SA".into(), "AE".into(), "KW".into()])
            .unwrap();
        assert_eq!(store.get_list("COUNTRIES").unwrap(), ["SA", "AE", "KW"]);

        store.upsert_list("COUNTRIES", &["QA".into()]).unwrap();
        assert_eq!(store.get_list("COUNTRIES").unwrap(), ["QA"]);
    }

    #[test]
    fn test_absent_list_is_empty() {
        assert!(store().get_list("NOPE").unwrap().is_empty());
    }

    #[test]
    fn test_map_composite_key() {
        let store = store();

        store.upsert_map("TIERS", "SA", "gold").unwrap();
        store.upsert_map("TIERS", "AE", "silver").unwrap();
        store.upsert_map("OTHER", "SA", "bronze").unwrap();

        assert_eq!(store.get_map("TIERS", "SA").unwrap().as_deref(), Some("gold"));
        assert_eq!(store.get_map("OTHER", "SA").unwrap().as_deref(), Some("bronze"));
        assert!(store.get_map("TIERS", "US").unwrap().is_none());

        // Overwrite one entry only
        store.upsert_map("TIERS", "SA", "platinum").unwrap();
        assert_eq!(store.get_map("TIERS", "SA").unwrap().as_deref(), Some("platinum"));
        assert_eq!(store.get_map("TIERS", "AE").unwrap().as_deref(), Some("silver"));
    }

    #[test]
    fn test_snapshot_sees_seeded_defaults() {
        let snapshot = store().snapshot().unwrap();

        assert_eq!(snapshot.numeric_parameter("AGE_MIN_MILL"), Some(25.0));
        assert_eq!(snapshot.numeric_parameter("AGE_MAX_MILL"), Some(40.0));
        assert_eq!(snapshot.numeric_parameter("INCOME_MIN_LEADER"), Some(20000.0));
        assert_eq!(snapshot.list("COUNTRIES_NAT_MILL"), ["SA", "AE"]);
    }

    #[test]
    fn test_snapshot_includes_maps() {
        let store = store();
        store.upsert_map("TIERS", "SA", "gold").unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.map_entry("TIERS", "SA"), Some("gold"));
    }

    #[test]
    fn test_dump_orders_rows() {
        let store = store();
        store.upsert_parameter("B_KEY", "2", "integer").unwrap();
        store.upsert_parameter("A_KEY", "1", "integer").unwrap();

        let (parameters, _, _) = store.dump().unwrap();
        let keys: Vec<&str> = parameters.iter().map(|p| p.key.as_str()).collect();
        let a = keys.iter().position(|k| *k == "A_KEY").unwrap();
        let b = keys.iter().position(|k| *k == "B_KEY").unwrap();
        assert!(a < b);
    }
}
