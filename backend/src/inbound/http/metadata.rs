//! Sensor-network metadata endpoints.
//!
//! ```text
//! GET /sensor-networks
//! GET /sensor-networks/{network}
//! GET /sensor-networks/{network}/nodes[/{node}]
//! GET /sensor-networks/{network}/features-of-interest[/{feature}]
//! GET /sensor-networks/{network}/sensors[/{sensor}]
//! ```
//!
//! Rendered bodies are cached under a fingerprint of the request path and
//! query string. Cache failures are logged and treated as misses.

use std::collections::BTreeMap;
use std::future::Future;

use actix_web::http::header::ContentType;
use actix_web::{HttpRequest, HttpResponse, get, web};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::domain::ports::{MetadataCacheKey, NodeFilter};
use crate::domain::{
    EchoedQuery, Error, Feature, FeatureName, NetworkName, NetworkSummary, NetworkView, Node,
    NodeId, ResponseEnvelope, Sensor, SensorName,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::error::EchoOnError;
use crate::inbound::http::schemas::{EnvelopeSchema, ErrorEnvelopeSchema};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FEATURES, FieldErrors, FieldName, NETWORK_NAME, NODE_ID, QueryName, RawQuery, SENSORS,
    parse_name, parse_node_filters, parse_sensor_filters, raw_echo,
};

/// Network metadata object.
#[derive(Debug, Serialize, ToSchema)]
pub struct NetworkBody {
    #[schema(example = "array_of_things_chicago")]
    pub name: String,
    /// Features reported by any sensor on any node of the network.
    pub features_of_interest: Vec<String>,
    pub nodes: Vec<String>,
    pub sensors: Vec<String>,
    #[schema(value_type = Object)]
    pub info: Value,
}

impl From<NetworkSummary> for NetworkBody {
    fn from(summary: NetworkSummary) -> Self {
        Self {
            name: summary.name.as_str().to_owned(),
            features_of_interest: names(&summary.features_of_interest),
            nodes: names(&summary.nodes),
            sensors: names(&summary.sensors),
            info: summary.info,
        }
    }
}

/// GeoJSON point; coordinates are `[lat, lng]`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PointBody {
    #[serde(rename = "type")]
    #[schema(example = "Point")]
    pub kind: &'static str,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NodePropertiesBody {
    pub id: String,
    pub network_name: String,
    pub sensors: Vec<String>,
    #[schema(value_type = Object)]
    pub info: Value,
}

/// Node metadata as a GeoJSON Feature.
#[derive(Debug, Serialize, ToSchema)]
pub struct NodeBody {
    #[serde(rename = "type")]
    #[schema(example = "Feature")]
    pub kind: &'static str,
    pub geometry: PointBody,
    pub properties: NodePropertiesBody,
}

impl From<&Node> for NodeBody {
    fn from(node: &Node) -> Self {
        Self {
            kind: "Feature",
            geometry: PointBody {
                kind: "Point",
                coordinates: [node.location.lat(), node.location.lng()],
            },
            properties: NodePropertiesBody {
                id: node.id.as_str().to_owned(),
                network_name: node.network.as_str().to_owned(),
                sensors: names(&node.sensors),
                info: node.info.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ObservedPropertyBody {
    #[schema(example = "temperature")]
    pub name: String,
    #[serde(rename = "type")]
    #[schema(example = "float")]
    pub property_type: String,
}

/// Feature-of-interest metadata object.
#[derive(Debug, Serialize, ToSchema)]
pub struct FeatureBody {
    #[schema(example = "temperature")]
    pub name: String,
    pub observed_properties: Vec<ObservedPropertyBody>,
}

impl From<&Feature> for FeatureBody {
    fn from(feature: &Feature) -> Self {
        Self {
            name: feature.name.as_str().to_owned(),
            observed_properties: feature
                .observed_properties
                .iter()
                .map(|property| ObservedPropertyBody {
                    name: property.name.clone(),
                    property_type: String::from(property.property_type),
                })
                .collect(),
        }
    }
}

/// Sensor metadata object; properties map raw keys to `feature.property`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SensorBody {
    #[schema(example = "tmp112")]
    pub name: String,
    pub observed_properties: BTreeMap<String, String>,
    #[schema(value_type = Object)]
    pub info: Value,
}

impl From<&Sensor> for SensorBody {
    fn from(sensor: &Sensor) -> Self {
        Self {
            name: sensor.name.as_str().to_owned(),
            observed_properties: sensor
                .observed_properties
                .iter()
                .map(|(raw, property)| (raw.clone(), property.to_string()))
                .collect(),
            info: sensor.info.clone(),
        }
    }
}

fn names<T: AsRef<str>>(values: &[T]) -> Vec<String> {
    values.iter().map(|value| value.as_ref().to_owned()).collect()
}

fn json_body(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::json())
        .body(body)
}

pub(crate) fn render<T: Serialize>(query: EchoedQuery, objects: Vec<T>) -> Result<String, Error> {
    serde_json::to_string(&ResponseEnvelope::ok(query, objects))
        .map_err(|err| Error::internal_with_debug("response could not be rendered", &err))
}

/// Serve `req` from the metadata cache or render and store it.
async fn cached<F, Fut>(state: &HttpState, req: &HttpRequest, render: F) -> ApiResult<HttpResponse>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<String>>,
{
    let key = MetadataCacheKey::for_request(req.path(), req.query_string());
    match state.cache.get(&key).await {
        Ok(Some(body)) => {
            debug!(%key, "metadata cache hit");
            return Ok(json_body(body));
        }
        Ok(None) => debug!(%key, "metadata cache miss"),
        Err(err) => warn!(%key, error = %err, "metadata cache read failed"),
    }
    let body = render().await?;
    if let Err(err) = state.cache.put(&key, &body).await {
        warn!(%key, error = %err, "metadata cache write failed");
    }
    Ok(json_body(body))
}

fn parse_path_name<T: QueryName>(
    value: &str,
    field: FieldName,
    echoed: &EchoedQuery,
) -> ApiResult<T> {
    let mut errors = FieldErrors::default();
    errors
        .capture(parse_name::<T>(value, field))
        .ok_or_else(|| errors.into_error())
        .echoing(echoed)
}

async fn load_view(state: &HttpState, network: &str, echoed: &EchoedQuery) -> ApiResult<NetworkView> {
    let name = parse_path_name::<NetworkName>(network, NETWORK_NAME, echoed)?;
    state.catalog.require_view(&name).await.echoing(echoed)
}

/// List every sensor network.
#[utoipa::path(
    get,
    path = "/sensor-networks",
    description = "Return metadata for every sensor network.",
    responses(
        (status = 200, description = "Network metadata", body = EnvelopeSchema),
        (status = 503, description = "Service unavailable", body = ErrorEnvelopeSchema),
        (status = 500, description = "Internal server error", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "listSensorNetworks"
)]
#[get("/sensor-networks")]
pub async fn list_networks(
    state: web::Data<HttpState>,
    req: HttpRequest,
) -> ApiResult<HttpResponse> {
    cached(&state, &req, || async {
        let views = state.catalog.networks().await?;
        let bodies: Vec<NetworkBody> = views.iter().map(|view| view.summary().into()).collect();
        Ok(render(EchoedQuery::default(), bodies)?)
    })
    .await
}

/// Describe one sensor network.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}",
    params(("network" = String, Path, description = "Network name")),
    responses(
        (status = 200, description = "Network metadata", body = EnvelopeSchema),
        (status = 400, description = "Unknown network", body = ErrorEnvelopeSchema),
        (status = 503, description = "Service unavailable", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "getSensorNetwork"
)]
#[get("/sensor-networks/{network}")]
pub async fn get_network(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let network = path.into_inner();
    cached(&state, &req, || async {
        let echoed = raw_echo(Some(&network), &RawQuery::new());
        let view = load_view(&state, &network, &echoed).await?;
        let body = NetworkBody::from(view.summary());
        Ok(render(echoed, vec![body])?)
    })
    .await
}

/// List the nodes of a network, optionally within a polygon.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/nodes",
    params(
        ("network" = String, Path, description = "Network name"),
        ("location_geom__within" = Option<String>, Query, description = "GeoJSON polygon")
    ),
    responses(
        (status = 200, description = "GeoJSON node features", body = EnvelopeSchema),
        (status = 400, description = "Invalid request", body = ErrorEnvelopeSchema),
        (status = 503, description = "Service unavailable", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "listNodes"
)]
#[get("/sensor-networks/{network}/nodes")]
pub async fn list_nodes(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    let network = path.into_inner();
    let raw = query.into_inner();
    cached(&state, &req, || async {
        let within = parse_node_filters(&network, &raw)?;
        let echoed = raw_echo(Some(&network), &RawQuery::new())
            .with_opt("location_geom__within", within.as_ref());
        let view = load_view(&state, &network, &echoed).await?;
        let bodies: Vec<NodeBody> = match within {
            None => view.nodes.iter().map(NodeBody::from).collect(),
            Some(polygon) => {
                let filter = NodeFilter {
                    within: Some(polygon),
                    ..NodeFilter::network(view.name().clone())
                };
                let nodes = state.catalog.nodes(&filter).await.echoing(&echoed)?;
                nodes.iter().map(NodeBody::from).collect()
            }
        };
        Ok(render(echoed, bodies)?)
    })
    .await
}

/// Describe one node.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/nodes/{node}",
    params(
        ("network" = String, Path, description = "Network name"),
        ("node" = String, Path, description = "Node id")
    ),
    responses(
        (status = 200, description = "GeoJSON node feature", body = EnvelopeSchema),
        (status = 400, description = "Unknown network or node", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "getNode"
)]
#[get("/sensor-networks/{network}/nodes/{node}")]
pub async fn get_node(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (network, node) = path.into_inner();
    cached(&state, &req, || async {
        let echoed = raw_echo(Some(&network), &RawQuery::new()).with(NODE_ID_KEY, json!(node));
        let view = load_view(&state, &network, &echoed).await?;
        let id = parse_path_name::<NodeId>(&node, NODE_ID, &echoed)?;
        let node = view
            .node(&id)
            .ok_or_else(|| Error::invalid_request(format!("Invalid node id: {id}")))
            .echoing(&echoed)?;
        Ok(render(echoed, vec![NodeBody::from(node)])?)
    })
    .await
}

const NODE_ID_KEY: &str = "node_id";

/// List the features of interest reported in a network.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/features-of-interest",
    params(("network" = String, Path, description = "Network name")),
    responses(
        (status = 200, description = "Feature metadata", body = EnvelopeSchema),
        (status = 400, description = "Unknown network", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "listFeatures"
)]
#[get("/sensor-networks/{network}/features-of-interest")]
pub async fn list_features(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let network = path.into_inner();
    cached(&state, &req, || async {
        let echoed = raw_echo(Some(&network), &RawQuery::new());
        let view = load_view(&state, &network, &echoed).await?;
        let bodies: Vec<FeatureBody> = view.features.iter().map(FeatureBody::from).collect();
        Ok(render(echoed, bodies)?)
    })
    .await
}

/// Describe one feature of interest.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/features-of-interest/{feature}",
    params(
        ("network" = String, Path, description = "Network name"),
        ("feature" = String, Path, description = "Feature name")
    ),
    responses(
        (status = 200, description = "Feature metadata", body = EnvelopeSchema),
        (status = 400, description = "Unknown network or feature", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "getFeature"
)]
#[get("/sensor-networks/{network}/features-of-interest/{feature}")]
pub async fn get_feature(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (network, feature) = path.into_inner();
    cached(&state, &req, || async {
        let echoed =
            raw_echo(Some(&network), &RawQuery::new()).with("features_of_interest", json!(feature));
        let view = load_view(&state, &network, &echoed).await?;
        let name = parse_path_name::<FeatureName>(&feature, FEATURES, &echoed)?;
        let feature = view
            .feature(&name)
            .ok_or_else(|| Error::invalid_request(format!("Invalid feature of interest: {name}")))
            .echoing(&echoed)?;
        Ok(render(echoed, vec![FeatureBody::from(feature)])?)
    })
    .await
}

/// List the sensors attached to a network's nodes.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/sensors",
    params(
        ("network" = String, Path, description = "Network name"),
        ("feature" = Option<String>, Query, description = "Only sensors reporting this feature"),
        ("node_id" = Option<String>, Query, description = "Only sensors on this node")
    ),
    responses(
        (status = 200, description = "Sensor metadata", body = EnvelopeSchema),
        (status = 400, description = "Invalid request", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "listSensors"
)]
#[get("/sensor-networks/{network}/sensors")]
pub async fn list_sensors(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<RawQuery>,
) -> ApiResult<HttpResponse> {
    let network = path.into_inner();
    let raw = query.into_inner();
    cached(&state, &req, || async {
        let filters = parse_sensor_filters(&network, &raw)?;
        let echoed = raw_echo(Some(&network), &RawQuery::new())
            .with_opt("feature", filters.feature.as_ref())
            .with_opt(NODE_ID_KEY, filters.node_id.as_ref());
        let view = load_view(&state, &network, &echoed).await?;
        if let Some(id) = &filters.node_id
            && view.node(id).is_none()
        {
            return Err(Error::invalid_request(format!("Invalid node id: {id}"))).echoing(&echoed);
        }
        let bodies: Vec<SensorBody> = view
            .sensors
            .iter()
            .filter(|sensor| {
                filters
                    .feature
                    .as_ref()
                    .is_none_or(|feature| sensor.reports_on(feature))
            })
            .filter(|sensor| {
                filters.node_id.as_ref().is_none_or(|id| {
                    view.node(id)
                        .is_some_and(|node| node.sensors.contains(&sensor.name))
                })
            })
            .map(SensorBody::from)
            .collect();
        Ok(render(echoed, bodies)?)
    })
    .await
}

/// Describe one sensor.
#[utoipa::path(
    get,
    path = "/sensor-networks/{network}/sensors/{sensor}",
    params(
        ("network" = String, Path, description = "Network name"),
        ("sensor" = String, Path, description = "Sensor name")
    ),
    responses(
        (status = 200, description = "Sensor metadata", body = EnvelopeSchema),
        (status = 400, description = "Unknown network or sensor", body = ErrorEnvelopeSchema)
    ),
    tags = ["metadata"],
    operation_id = "getSensor"
)]
#[get("/sensor-networks/{network}/sensors/{sensor}")]
pub async fn get_sensor(
    state: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (network, sensor) = path.into_inner();
    cached(&state, &req, || async {
        let echoed = raw_echo(Some(&network), &RawQuery::new()).with("sensor", json!(sensor));
        let view = load_view(&state, &network, &echoed).await?;
        let name = parse_path_name::<SensorName>(&sensor, SENSORS, &echoed)?;
        let sensor = view
            .sensor(&name)
            .ok_or_else(|| Error::invalid_request(format!("Invalid sensor name: {name}")))
            .echoing(&echoed)?;
        Ok(render(echoed, vec![SensorBody::from(sensor)])?)
    })
    .await
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
