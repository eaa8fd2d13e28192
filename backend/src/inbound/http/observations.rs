//! Observation query, datadump submission and aggregate endpoints.
//!
//! ```text
//! GET /sensor-networks/{network}/query
//! GET /sensor-networks/{network}/nodes/query
//! GET /sensor-networks/{network}/nodes/{node}/query
//! GET /sensor-networks/{network}/download
//! GET /sensor-networks/{network}/aggregate
//! ```

use actix_web::{HttpRequest, HttpResponse, get, web};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::domain::ResponseEnvelope;
use crate::inbound::http::ApiResult;
use crate::inbound::http::error::EchoOnError;
use crate::inbound::http::schemas::{
    AggregateEnvelopeSchema, ErrorEnvelopeSchema, ObservationEnvelopeSchema,
};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    LimitPolicy, RawQuery, parse_aggregate_request, parse_observation_request,
};

/// Accepted datadump request.
#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadResponse {
    /// Job ticket used for status and retrieval.
    #[schema(example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
    pub ticket: String,
    /// Where the job status can be polled.
    #[schema(example = "http://localhost:8080/jobs/3fa85f64-5717-4562-b3fc-2c963f66afa6")]
    pub url: String,
}

async fn answer(
    state: &HttpState,
    network: &str,
    node: Option<&str>,
    raw: &RawQuery,
) -> ApiResult<HttpResponse> {
    let (request, echoed) =
        parse_observation_request(network, node, raw, state.now(), LimitPolicy::Interactive)?;
    let result = state.observations.query(&request).await.echoing(&echoed)?;
    Ok(HttpResponse::Ok().json(ResponseEnvelope::ok(echoed, result.records)))
}

/// Query observations across a network.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/query",
    description = "Return observations ordered by datetime. Filters: nodes, sensors, features_of_interest, start_datetime, end_datetime, location_geom__within, limit, offset.",
    params(("network" = String, Path, description = "Network name")),
    responses(
        (status = 200, description = "Observations", body = ObservationEnvelopeSchema),
        (status = 400, description = "Invalid request or missing feature table", body = ErrorEnvelopeSchema),
        (status = 503, description = "Warehouse unavailable", body = ErrorEnvelopeSchema),
        (status = 500, description = "Internal server error", body = ErrorEnvelopeSchema)
    ),
    tags = ["observations"],
    operation_id = "queryNetwork"
)]
#[get("/sensor-networks/{network}/query")]
pub async fn query_network(
    state: web::Data<HttpState>,
    path: web::Path<String>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    answer(&state, &path, None, &query).await
}

/// Query observations of a set of nodes.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/nodes/query",
    params(("network" = String, Path, description = "Network name")),
    responses(
        (status = 200, description = "Observations", body = ObservationEnvelopeSchema),
        (status = 400, description = "Invalid request or missing feature table", body = ErrorEnvelopeSchema)
    ),
    tags = ["observations"],
    operation_id = "queryNodes"
)]
#[get("/sensor-networks/{network}/nodes/query")]
pub async fn query_nodes(
    state: web::Data<HttpState>,
    path: web::Path<String>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    answer(&state, &path, None, &query).await
}

/// Query observations of one node.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/nodes/{node}/query",
    params(
        ("network" = String, Path, description = "Network name"),
        ("node" = String, Path, description = "Node id")
    ),
    responses(
        (status = 200, description = "Observations", body = ObservationEnvelopeSchema),
        (status = 400, description = "Invalid request or missing feature table", body = ErrorEnvelopeSchema)
    ),
    tags = ["observations"],
    operation_id = "queryNode"
)]
#[get("/sensor-networks/{network}/nodes/{node}/query")]
pub async fn query_node(
    state: web::Data<HttpState>,
    path: web::Path<(String, String)>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    let (network, node) = path.into_inner();
    answer(&state, &network, Some(&node), &query).await
}

/// Queue a chunked export of an observation query.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/download",
    description = "Validate and plan the query, then queue a datadump job. `limit` is optional and unbounded.",
    params(("network" = String, Path, description = "Network name")),
    responses(
        (status = 200, description = "Job queued", body = DownloadResponse),
        (status = 400, description = "Invalid request or missing feature table", body = ErrorEnvelopeSchema),
        (status = 503, description = "Queue or status store unavailable", body = ErrorEnvelopeSchema)
    ),
    tags = ["datadumps"],
    operation_id = "downloadObservations"
)]
#[get("/sensor-networks/{network}/download")]
pub async fn download(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    let (request, echoed) =
        parse_observation_request(&path, None, &query, state.now(), LimitPolicy::Datadump)?;
    let url_root = state.url_root_for(&req);
    let submission = state
        .datadumps
        .submit(request, &url_root)
        .await
        .echoing(&echoed)?;
    info!(ticket = %submission.ticket, "datadump accepted");
    Ok(HttpResponse::Ok().json(DownloadResponse {
        ticket: submission.ticket.to_string(),
        url: submission.url,
    }))
}

/// Aggregate one node's observations of one feature into time buckets.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/aggregate",
    description = "Required: node, function, features_of_interest (one feature). Optional: start_datetime, end_datetime, agg, sensors.",
    params(("network" = String, Path, description = "Network name")),
    responses(
        (status = 200, description = "Buckets ordered by time", body = AggregateEnvelopeSchema),
        (status = 400, description = "Invalid request", body = ErrorEnvelopeSchema),
        (status = 422, description = "Aggregation cannot be computed", body = ErrorEnvelopeSchema)
    ),
    tags = ["observations"],
    operation_id = "aggregateObservations"
)]
#[get("/sensor-networks/{network}/aggregate")]
pub async fn aggregate(
    state: web::Data<HttpState>,
    path: web::Path<String>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    let (request, echoed) = parse_aggregate_request(&path, &query, state.now())?;
    let buckets = state
        .aggregation
        .aggregate(&request)
        .await
        .echoing(&echoed)?;
    Ok(HttpResponse::Ok().json(ResponseEnvelope::ok(echoed, buckets)))
}
