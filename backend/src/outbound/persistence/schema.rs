//! Diesel table definitions for the datadump tables.
//!
//! These must match `migrations/2024-01-02-000000_datadumps`. The sensor
//! metadata and observation tables are read through `sql_query` because
//! their PostGIS columns and per-feature layouts have no static schema.

diesel::table! {
    /// Persisted datadump chunks.
    ///
    /// `(request, part)` is unique; part `0` holds the job manifest.
    datadumps (id) {
        /// Surrogate key.
        id -> Int8,
        /// Job ticket the chunk belongs to.
        request -> Uuid,
        /// Chunk number, `1..=total` for data and `0` for the manifest.
        part -> Int4,
        /// Total data chunks of the job.
        total -> Int4,
        /// Serialised JSON payload.
        data -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Durable queue of datadump jobs.
    datadump_jobs (ticket) {
        ticket -> Uuid,
        /// Serialised `DatadumpJob`.
        payload -> Jsonb,
        /// One of `queued`, `claimed`, `done` or `dead`.
        state -> Text,
        attempts -> Int4,
        /// Worker currently holding the claim.
        worker -> Nullable<Text>,
        enqueued_at -> Timestamptz,
        claimed_at -> Nullable<Timestamptz>,
    }
}
