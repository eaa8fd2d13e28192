//! Datadump job status and retrieval endpoints.
//!
//! ```text
//! GET /jobs/{ticket}
//! GET /datadump/{ticket}?part=N
//! ```

use actix_web::{HttpResponse, get, web};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::{DatadumpChunk, Error};
use crate::inbound::http::ApiResult;
use crate::inbound::http::cache_control::job_tracking_header;
use crate::inbound::http::schemas::{ErrorEnvelopeSchema, JobStatusSchema};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{RawQuery, parse_chunk_address, parse_ticket};

/// One stored datadump part. Part `0` carries the manifest.
#[derive(Debug, Serialize, ToSchema)]
pub struct DatadumpPartResponse {
    #[schema(example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
    pub ticket: String,
    #[schema(example = 1)]
    pub part: u32,
    #[schema(example = 3)]
    pub total: u32,
    /// Observation records, or the manifest object for part `0`.
    #[schema(value_type = Object)]
    pub data: Value,
}

impl TryFrom<DatadumpChunk> for DatadumpPartResponse {
    type Error = Error;

    fn try_from(chunk: DatadumpChunk) -> Result<Self, Self::Error> {
        let data = serde_json::from_str(&chunk.data)
            .map_err(|err| Error::internal_with_debug("stored datadump part is not JSON", &err))?;
        Ok(Self {
            ticket: chunk.ticket.to_string(),
            part: chunk.part,
            total: chunk.total,
            data,
        })
    }
}

/// Report the status of a datadump job.
#[utoipa::path(
    get,
    path = "/jobs/{ticket}",
    params(("ticket" = String, Path, description = "Job ticket")),
    responses(
        (
            status = 200,
            description = "Job status",
            headers(("Cache-Control" = String, description = "Cache control header")),
            body = JobStatusSchema
        ),
        (status = 400, description = "Malformed ticket", body = ErrorEnvelopeSchema),
        (status = 404, description = "Unknown ticket", body = ErrorEnvelopeSchema),
        (status = 503, description = "Status store unavailable", body = ErrorEnvelopeSchema)
    ),
    tags = ["datadumps"],
    operation_id = "getJobStatus"
)]
#[get("/jobs/{ticket}")]
pub async fn job_status(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let ticket = parse_ticket(&path)?;
    let status = state.datadumps.status(&ticket).await?;
    Ok(HttpResponse::Ok()
        .insert_header(job_tracking_header())
        .json(status))
}

/// Fetch the manifest or one chunk of a finished datadump.
#[utoipa::path(
    get,
    path = "/datadump/{ticket}",
    params(
        ("ticket" = String, Path, description = "Job ticket"),
        ("part" = Option<u32>, Query, description = "Chunk number; 0 or absent for the manifest")
    ),
    responses(
        (
            status = 200,
            description = "Datadump part",
            headers(("Cache-Control" = String, description = "Cache control header")),
            body = DatadumpPartResponse
        ),
        (status = 400, description = "Malformed ticket or part", body = ErrorEnvelopeSchema),
        (status = 404, description = "Part not stored", body = ErrorEnvelopeSchema)
    ),
    tags = ["datadumps"],
    operation_id = "getDatadumpPart"
)]
#[get("/datadump/{ticket}")]
pub async fn datadump_part(
    state: web::Data<HttpState>,
    path: web::Path<String>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    let (ticket, part) = parse_chunk_address(&path, &query)?;
    let chunk = state.datadumps.chunk(&ticket, part).await?;
    let body = DatadumpPartResponse::try_from(chunk)?;
    Ok(HttpResponse::Ok()
        .insert_header(job_tracking_header())
        .json(body))
}
