//! SQLite-backed persistence for the persona engine.
//!
//! All durable state lives here: the three configuration primitives
//! (parameters, lists, maps), profile-to-persona assignments, and the
//! append-only audit log. Mutation goes through upserts keyed by natural
//! uniqueness constraints; the multi-row assignment write is the only
//! operation that needs an explicit transaction.

mod assignments;
mod audit;
mod config_store;
mod db;
mod schema;

pub use assignments::{AssignmentRow, AssignmentStore};
pub use audit::{AuditAction, AuditEntry, AuditQuery, AuditStore};
pub use config_store::{ConfigStore, ListRow, MapRow, ParameterRow};
pub use db::Database;
