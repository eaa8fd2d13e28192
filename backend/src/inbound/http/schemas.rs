//! OpenAPI schema definitions for domain types.
//!
//! Domain types remain framework-agnostic by not deriving `ToSchema`. This
//! module provides the schema definitions required for OpenAPI documentation
//! using utoipa's external schema registration.
//!
//! The schema wrappers mirror the serialised shape of their domain types but
//! live in the inbound adapter layer where framework concerns belong.

use utoipa::ToSchema;

/// OpenAPI schema for [`crate::domain::EnvelopeStatus`].
#[derive(ToSchema)]
#[schema(as = crate::domain::EnvelopeStatus)]
pub enum EnvelopeStatusSchema {
    #[schema(rename = "ok")]
    Ok,
    #[schema(rename = "error")]
    Error,
}

/// OpenAPI schema for [`crate::domain::EnvelopeMeta`].
#[derive(ToSchema)]
#[schema(as = crate::domain::EnvelopeMeta)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct EnvelopeMetaSchema {
    status: EnvelopeStatusSchema,
    /// Empty on success; the failure reason otherwise.
    #[schema(example = "Table gas_concentration not found")]
    message: String,
    /// Resolved query arguments; absent filters are omitted.
    #[schema(value_type = Object)]
    query: serde_json::Value,
}

/// Envelope shared by every metadata response.
#[derive(ToSchema)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct EnvelopeSchema {
    meta: EnvelopeMetaSchema,
    #[schema(value_type = Vec<Object>)]
    objects: Vec<serde_json::Value>,
}

/// Envelope returned for every failed request.
#[derive(ToSchema)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct ErrorEnvelopeSchema {
    meta: EnvelopeMetaSchema,
    /// Always empty.
    #[schema(value_type = Vec<Object>)]
    objects: Vec<serde_json::Value>,
    /// Field-level validation failures, or `{"table": ...}` for a missing
    /// table.
    #[schema(value_type = Option<Object>)]
    errors: Option<serde_json::Value>,
}

/// OpenAPI schema for [`crate::domain::ObservationRecord`].
#[derive(ToSchema)]
#[schema(as = crate::domain::ObservationRecord)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct ObservationRecordSchema {
    #[schema(example = "0000001e0610ba72")]
    node_id: String,
    meta_id: Option<f64>,
    /// ISO 8601 without a UTC offset suffix.
    #[schema(example = "2016-01-01T00:00:00")]
    datetime: String,
    #[schema(example = "tmp112")]
    sensor: String,
    /// Source table; the feature name unless tables are network-prefixed.
    #[schema(example = "temperature")]
    feature_of_interest: String,
    #[schema(value_type = Object)]
    results: serde_json::Value,
}

/// Envelope of an observation query.
#[derive(ToSchema)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct ObservationEnvelopeSchema {
    meta: EnvelopeMetaSchema,
    objects: Vec<ObservationRecordSchema>,
}

/// Envelope of an aggregate query. Each object holds `time_bucket`,
/// `count` and one value per numeric property.
#[derive(ToSchema)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct AggregateEnvelopeSchema {
    meta: EnvelopeMetaSchema,
    #[schema(value_type = Vec<Object>)]
    objects: Vec<serde_json::Value>,
}

/// OpenAPI schema for [`crate::domain::JobState`].
#[derive(ToSchema)]
#[schema(as = crate::domain::JobState)]
pub enum JobStateSchema {
    #[schema(rename = "created")]
    Created,
    #[schema(rename = "running")]
    Running,
    #[schema(rename = "complete")]
    Complete,
    #[schema(rename = "failed")]
    Failed,
}

/// OpenAPI schema for [`crate::domain::JobMeta`].
#[derive(ToSchema)]
#[schema(as = crate::domain::JobMeta, rename_all = "camelCase")]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct JobMetaSchema {
    state: JobStateSchema,
    start_time: Option<String>,
    end_time: Option<String>,
    workers: Vec<String>,
    features: Vec<String>,
}

/// OpenAPI schema for [`crate::domain::JobProgress`].
#[derive(ToSchema)]
#[schema(as = crate::domain::JobProgress)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct JobProgressSchema {
    #[schema(example = 2)]
    done: u32,
    #[schema(example = 3)]
    total: u32,
}

/// OpenAPI schema for [`crate::domain::JobStatus`].
#[derive(ToSchema)]
#[schema(as = crate::domain::JobStatus)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct JobStatusSchema {
    meta: JobMetaSchema,
    progress: Option<JobProgressSchema>,
    /// `{"url": ...}` once complete.
    #[schema(value_type = Option<Object>)]
    result: Option<serde_json::Value>,
    error: Option<String>,
}
