//! Sensor-network observation query engine.
//!
//! Domain services live in [`domain`]; HTTP handlers in [`inbound`]; the
//! PostgreSQL, Redis and in-memory adapters in [`outbound`].

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
