//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every sensor-network, datadump and health endpoint
//! together with the schema wrappers from
//! [`crate::inbound::http::schemas`]. The document backs Swagger UI in debug
//! builds and is exported by `cargo run --bin openapi-dump`.

use crate::inbound::http::jobs::DatadumpPartResponse;
use crate::inbound::http::metadata::{
    FeatureBody, NetworkBody, NodeBody, NodePropertiesBody, ObservedPropertyBody, PointBody,
    SensorBody,
};
use crate::inbound::http::observations::DownloadResponse;
use crate::inbound::http::schemas::{
    AggregateEnvelopeSchema, EnvelopeMetaSchema, EnvelopeSchema, EnvelopeStatusSchema,
    ErrorEnvelopeSchema, JobMetaSchema, JobProgressSchema, JobStateSchema, JobStatusSchema,
    ObservationEnvelopeSchema, ObservationRecordSchema,
};
use utoipa::OpenApi;

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sensornet observation API",
        description = "Sensor-network metadata, observation queries, aggregates and chunked datadumps."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::metadata::list_networks,
        crate::inbound::http::metadata::get_network,
        crate::inbound::http::metadata::list_nodes,
        crate::inbound::http::metadata::get_node,
        crate::inbound::http::metadata::list_features,
        crate::inbound::http::metadata::get_feature,
        crate::inbound::http::metadata::list_sensors,
        crate::inbound::http::metadata::get_sensor,
        crate::inbound::http::observations::query_network,
        crate::inbound::http::observations::query_nodes,
        crate::inbound::http::observations::query_node,
        crate::inbound::http::observations::download,
        crate::inbound::http::observations::aggregate,
        crate::inbound::http::jobs::job_status,
        crate::inbound::http::jobs::datadump_part,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        EnvelopeStatusSchema,
        EnvelopeMetaSchema,
        EnvelopeSchema,
        ErrorEnvelopeSchema,
        ObservationRecordSchema,
        ObservationEnvelopeSchema,
        AggregateEnvelopeSchema,
        JobStateSchema,
        JobMetaSchema,
        JobProgressSchema,
        JobStatusSchema,
        NetworkBody,
        PointBody,
        NodePropertiesBody,
        NodeBody,
        ObservedPropertyBody,
        FeatureBody,
        SensorBody,
        DownloadResponse,
        DatadumpPartResponse,
    )),
    tags(
        (name = "metadata", description = "Networks, nodes, sensors and features of interest"),
        (name = "observations", description = "Observation queries and aggregates"),
        (name = "datadumps", description = "Chunked exports and their job status"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    //! Tests verifying OpenAPI schema field structure.

    use super::*;
    use crate::test_support::openapi::{get_property, unwrap_object_schema};
    use rstest::rstest;

    // Note: utoipa replaces :: with . in schema names
    const JOB_STATUS_SCHEMA_NAME: &str = "crate.domain.JobStatus";
    const RECORD_SCHEMA_NAME: &str = "crate.domain.ObservationRecord";

    #[rstest]
    #[case(JOB_STATUS_SCHEMA_NAME, &["meta", "progress", "result"])]
    #[case(RECORD_SCHEMA_NAME, &["node_id", "datetime", "feature_of_interest", "results"])]
    #[case("ErrorEnvelopeSchema", &["meta", "objects", "errors"])]
    fn schemas_expose_their_fields(#[case] name: &str, #[case] fields: &[&str]) {
        let doc = ApiDoc::openapi();
        let schemas = &doc.components.as_ref().expect("components").schemas;
        let schema = schemas.get(name).expect("schema registered");
        let object = unwrap_object_schema(schema, name);
        for field in fields {
            get_property(object, field);
        }
    }

    #[rstest]
    #[case("/sensor-networks/{network}/query")]
    #[case("/sensor-networks/{network}/aggregate")]
    #[case("/sensor-networks/{network}/download")]
    #[case("/jobs/{ticket}")]
    #[case("/datadump/{ticket}")]
    #[case("/health/ready")]
    fn every_endpoint_is_documented(#[case] path: &str) {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key(path), "missing {path}");
    }
}
