//! HTTP adapter mapping for domain errors.
//!
//! Purpose: keep the domain error type HTTP-agnostic while allowing Actix
//! handlers to turn domain failures into the shared `{meta, objects}`
//! envelope with a matching status code. The envelope echoes the query the
//! caller sent so failures can be correlated with their request.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::domain::{EchoedQuery, Error, ErrorCode, ResponseEnvelope, TRACE_ID_HEADER};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// A domain error paired with the query it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    error: Error,
    query: EchoedQuery,
}

impl ApiError {
    pub fn new(error: Error, query: EchoedQuery) -> Self {
        Self { error, query }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    pub fn query(&self) -> &EchoedQuery {
        &self.query
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error, EchoedQuery::default())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

/// Attach the echoed query to a failing domain call.
pub trait EchoOnError<T> {
    fn echoing(self, query: &EchoedQuery) -> ApiResult<T>;
}

impl<T> EchoOnError<T> for Result<T, Error> {
    fn echoing(self, query: &EchoedQuery) -> ApiResult<T> {
        self.map_err(|error| ApiError::new(error, query.clone()))
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest | ErrorCode::MissingTable => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error body: the shared envelope plus optional field-level details.
#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(flatten)]
    envelope: ResponseEnvelope<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a Value>,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        status_for(self.error.code())
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = ?self.error.code(), message = %self.error.message(), "request failed");
        } else {
            warn!(code = ?self.error.code(), message = %self.error.message(), "request rejected");
        }

        let mut builder = HttpResponse::build(status);
        if let Some(id) = self.error.trace_id() {
            builder.insert_header((TRACE_ID_HEADER, id.to_owned()));
        }
        builder.json(ErrorBody {
            envelope: ResponseEnvelope::error(self.query.clone(), self.error.message()),
            errors: self.error.details(),
        })
    }
}

impl From<actix_web::Error> for ApiError {
    fn from(err: actix_web::Error) -> Self {
        error!(error = %err, "actix error promoted to domain error");
        Error::internal_with_debug("request could not be handled", &err).into()
    }
}

#[cfg(test)]
mod tests;
