//! PostgreSQL-backed sensor-network metadata adapter.
//!
//! Reads the `sensor__*` metadata tables. Node locations live in a PostGIS
//! point column, so the `within` filter is evaluated by the database.

use std::collections::{BTreeMap, BTreeSet};

use diesel::sql_query;
use diesel::sql_types::{Array, Double, Jsonb, Nullable, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::domain::ports::{NodeFilter, SensorCatalogRepository, SensorCatalogRepositoryError};
use crate::domain::{
    Feature, FeatureName, FeatureProperty, GeoPoint, Network, NetworkName, Node, NodeId,
    ObservedPropertyDef, Sensor, SensorName,
};

use super::diesel_helpers::{map_basic_diesel_error, map_pool_error_message};
use super::pool::{DbPool, PoolError};

/// Diesel-backed implementation of [`SensorCatalogRepository`].
#[derive(Clone)]
pub struct DieselSensorCatalogRepository {
    pool: DbPool,
}

impl DieselSensorCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const NETWORKS_SQL: &str = r#"
SELECT name, info
FROM sensor__network_metadata
ORDER BY lower(name)
"#;

const NODES_SQL: &str = r#"
SELECT
    n.id,
    n.sensor_network,
    ST_Y(n.location) AS lat,
    ST_X(n.location) AS lng,
    n.info,
    coalesce(
        array_agg(lower(s.sensor) ORDER BY lower(s.sensor)) FILTER (WHERE s.sensor IS NOT NULL),
        '{}'
    ) AS sensors
FROM sensor__node_metadata n
LEFT JOIN sensor__sensor_to_node s
    ON s.node = n.id AND s.network = n.sensor_network
WHERE lower(n.sensor_network) = $1
  AND ($2::text IS NULL OR lower(n.id) = $2)
  AND ($3::text[] IS NULL OR lower(n.id) = ANY($3))
  AND ($4::text IS NULL OR ST_Within(n.location, ST_SetSRID(ST_GeomFromGeoJSON($4), 4326)))
GROUP BY n.id, n.sensor_network
ORDER BY lower(n.id)
"#;

const SENSORS_SQL: &str = r#"
SELECT name, observed_properties, info
FROM sensor__sensor_metadata
ORDER BY lower(name)
"#;

const FEATURES_SQL: &str = r#"
SELECT
    f.name,
    f.observed_properties,
    coalesce(
        array_agg(lower(ftn.network)) FILTER (WHERE ftn.network IS NOT NULL),
        '{}'
    ) AS networks
FROM sensor__feature_metadata f
LEFT JOIN sensor__feature_to_network ftn ON ftn.feature = f.name
GROUP BY f.name
ORDER BY lower(f.name)
"#;

#[derive(Debug, QueryableByName)]
struct NetworkRow {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Jsonb)]
    info: Value,
}

#[derive(Debug, QueryableByName)]
struct NodeRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    sensor_network: String,
    #[diesel(sql_type = Double)]
    lat: f64,
    #[diesel(sql_type = Double)]
    lng: f64,
    #[diesel(sql_type = Jsonb)]
    info: Value,
    #[diesel(sql_type = Array<Text>)]
    sensors: Vec<String>,
}

#[derive(Debug, QueryableByName)]
struct SensorRow {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Jsonb)]
    observed_properties: Value,
    #[diesel(sql_type = Jsonb)]
    info: Value,
}

#[derive(Debug, QueryableByName)]
struct FeatureRow {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Jsonb)]
    observed_properties: Value,
    #[diesel(sql_type = Array<Text>)]
    networks: Vec<String>,
}

fn map_pool_error(error: PoolError) -> SensorCatalogRepositoryError {
    SensorCatalogRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(operation: &'static str) -> impl Fn(diesel::result::Error) -> SensorCatalogRepositoryError {
    move |error| {
        map_basic_diesel_error(
            &error,
            operation,
            SensorCatalogRepositoryError::query,
            SensorCatalogRepositoryError::connection,
        )
    }
}

fn invalid_row(kind: &str, name: &str, err: impl std::fmt::Display) -> SensorCatalogRepositoryError {
    SensorCatalogRepositoryError::query(format!("invalid {kind} row {name}: {err}"))
}

fn network_from_row(row: NetworkRow) -> Result<Network, SensorCatalogRepositoryError> {
    let name = NetworkName::new(&row.name).map_err(|err| invalid_row("network", &row.name, err))?;
    Ok(Network {
        name,
        info: row.info,
    })
}

fn node_from_row(row: NodeRow) -> Result<Node, SensorCatalogRepositoryError> {
    let invalid = |err: &dyn std::fmt::Display| invalid_row("node", &row.id, err);
    let id = NodeId::new(&row.id).map_err(|err| invalid(&err))?;
    let network = NetworkName::new(&row.sensor_network).map_err(|err| invalid(&err))?;
    let location = GeoPoint::new(row.lat, row.lng).map_err(|err| invalid(&err))?;
    let sensors = row
        .sensors
        .iter()
        .map(SensorName::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| invalid(&err))?;
    Ok(Node {
        id,
        network,
        location,
        sensors,
        info: row.info,
    })
}

fn sensor_from_row(row: SensorRow) -> Result<Sensor, SensorCatalogRepositoryError> {
    let name = SensorName::new(&row.name).map_err(|err| invalid_row("sensor", &row.name, err))?;
    let observed_properties: BTreeMap<String, FeatureProperty> =
        serde_json::from_value::<BTreeMap<String, FeatureProperty>>(row.observed_properties)
            .map_err(|err| invalid_row("sensor", &row.name, err))?
            .into_iter()
            .map(|(raw, prop)| (raw.to_lowercase(), prop))
            .collect();
    Ok(Sensor {
        name,
        observed_properties,
        info: row.info,
    })
}

fn feature_from_row(row: FeatureRow) -> Result<Feature, SensorCatalogRepositoryError> {
    let name = FeatureName::new(&row.name).map_err(|err| invalid_row("feature", &row.name, err))?;
    let observed_properties: Vec<ObservedPropertyDef> =
        serde_json::from_value(row.observed_properties)
            .map_err(|err| invalid_row("feature", &row.name, err))?;
    let networks = row
        .networks
        .iter()
        .map(NetworkName::new)
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(|err| invalid_row("feature", &row.name, err))?;
    Ok(Feature {
        name,
        observed_properties,
        networks,
    })
}

#[async_trait::async_trait]
impl SensorCatalogRepository for DieselSensorCatalogRepository {
    async fn list_networks(&self) -> Result<Vec<Network>, SensorCatalogRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<NetworkRow> = sql_query(NETWORKS_SQL)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("list networks"))?;
        rows.into_iter().map(network_from_row).collect()
    }

    async fn list_nodes(
        &self,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>, SensorCatalogRepositoryError> {
        let node_id = filter.node_id.as_ref().map(|id| id.as_str().to_owned());
        let nodes = filter
            .nodes
            .as_ref()
            .map(|ids| ids.iter().map(|id| id.as_str().to_owned()).collect::<Vec<_>>());
        let within = filter.within.as_ref().map(|polygon| polygon.as_geojson().to_owned());

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<NodeRow> = sql_query(NODES_SQL)
            .bind::<Text, _>(filter.network.as_str())
            .bind::<Nullable<Text>, _>(node_id)
            .bind::<Nullable<Array<Text>>, _>(nodes)
            .bind::<Nullable<Text>, _>(within)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("list nodes"))?;
        rows.into_iter().map(node_from_row).collect()
    }

    async fn list_sensors(&self) -> Result<Vec<Sensor>, SensorCatalogRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<SensorRow> = sql_query(SENSORS_SQL)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("list sensors"))?;
        rows.into_iter().map(sensor_from_row).collect()
    }

    async fn list_features(&self) -> Result<Vec<Feature>, SensorCatalogRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<FeatureRow> = sql_query(FEATURES_SQL)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("list features"))?;
        rows.into_iter().map(feature_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PropertyType;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn node_rows_normalise_names() {
        let node = node_from_row(NodeRow {
            id: "0000001E0610BA46".to_owned(),
            sensor_network: "Array_Of_Things_Chicago".to_owned(),
            lat: 41.878,
            lng: -87.63,
            info: json!({"address": "State St"}),
            sensors: vec!["tmp112".to_owned(), "htu21d".to_owned()],
        })
        .expect("valid node");

        assert_eq!(node.id.as_str(), "0000001e0610ba46");
        assert_eq!(node.network.as_str(), "array_of_things_chicago");
        assert_eq!(node.sensors.len(), 2);
        assert!((node.location.lng() + 87.63).abs() < f64::EPSILON);
    }

    #[rstest]
    fn node_rows_with_bad_coordinates_are_query_errors() {
        let err = node_from_row(NodeRow {
            id: "n1".to_owned(),
            sensor_network: "aot".to_owned(),
            lat: 120.0,
            lng: 0.0,
            info: Value::Null,
            sensors: Vec::new(),
        })
        .expect_err("latitude out of range");

        assert!(matches!(err, SensorCatalogRepositoryError::Query { .. }));
    }

    #[rstest]
    fn sensor_rows_parse_the_property_map() {
        let sensor = sensor_from_row(SensorRow {
            name: "HTU21D".to_owned(),
            observed_properties: json!({
                "Temperature": "temperature.temperature",
                "humidity": "relative_humidity.humidity",
            }),
            info: json!({}),
        })
        .expect("valid sensor");

        assert_eq!(sensor.name.as_str(), "htu21d");
        assert_eq!(
            sensor.observed_properties["temperature"].to_string(),
            "temperature.temperature"
        );
        assert_eq!(sensor.features().len(), 2);
    }

    #[rstest]
    fn sensor_rows_reject_undotted_properties() {
        let err = sensor_from_row(SensorRow {
            name: "tmp112".to_owned(),
            observed_properties: json!({"temperature": "temperature"}),
            info: json!({}),
        })
        .expect_err("undotted property");

        assert!(err.to_string().contains("tmp112"));
    }

    #[rstest]
    fn feature_rows_keep_property_order() {
        let feature = feature_from_row(FeatureRow {
            name: "magnetic_field".to_owned(),
            observed_properties: json!([
                {"name": "x", "type": "float"},
                {"name": "y", "type": "float"},
                {"name": "label", "type": "string"},
            ]),
            networks: vec!["Array_Of_Things_Chicago".to_owned()],
        })
        .expect("valid feature");

        let names: Vec<_> = feature.observed_properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "label"]);
        assert_eq!(feature.observed_properties[2].property_type, PropertyType::String);
        assert!(
            feature
                .networks
                .contains(&NetworkName::new("array_of_things_chicago").expect("network"))
        );
    }
}
