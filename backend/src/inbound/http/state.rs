//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain services and ports and remain testable without I/O.

use std::sync::Arc;

use actix_web::HttpRequest;
use chrono::NaiveDateTime;
use mockable::Clock;

use crate::domain::ports::ResponseCache;
use crate::domain::{AggregationService, DatadumpService, ObservationQueryService, SensorCatalog};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub catalog: SensorCatalog,
    pub observations: ObservationQueryService,
    pub aggregation: AggregationService,
    pub datadumps: DatadumpService,
    pub cache: Arc<dyn ResponseCache>,
    pub clock: Arc<dyn Clock>,
    /// Public URL root for job links; derived from the request when unset.
    pub url_root: Option<String>,
}

impl HttpState {
    /// Current time as the naive UTC value used for default windows.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.utc().naive_utc()
    }

    /// URL root for links handed back to `req`'s caller.
    ///
    /// # Examples
    /// ```ignore
    /// let root = state.url_root_for(&req);
    /// assert!(root.starts_with("http"));
    /// ```
    pub fn url_root_for(&self, req: &HttpRequest) -> String {
        match &self.url_root {
            Some(root) => root.trim_end_matches('/').to_owned(),
            None => {
                let info = req.connection_info();
                format!("{}://{}", info.scheme(), info.host())
            }
        }
    }
}
