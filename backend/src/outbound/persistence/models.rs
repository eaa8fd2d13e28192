//! Internal Diesel row structs for the datadump tables.
//!
//! These never leave the persistence layer; adapters convert them to
//! domain types.

use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{datadump_jobs, datadumps};

/// Row read back from `datadumps`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = datadumps)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DatadumpRow {
    pub request: Uuid,
    pub part: i32,
    pub total: i32,
    pub data: String,
}

/// Insertable chunk.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = datadumps)]
pub(crate) struct NewDatadumpRow<'a> {
    pub request: Uuid,
    pub part: i32,
    pub total: i32,
    pub data: &'a str,
}

/// Insertable queue entry; state and timestamps take column defaults.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = datadump_jobs)]
pub(crate) struct NewDatadumpJobRow {
    pub ticket: Uuid,
    pub payload: serde_json::Value,
}
