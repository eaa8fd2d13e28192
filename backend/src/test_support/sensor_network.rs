//! Seed data modelled on the Array of Things Chicago deployment.
//!
//! - `array_of_things_chicago`: three nodes, five sensors, five features
//!   (`gas_concentration` has no warehouse table).
//! - `array_of_things_denver`: one node reporting `temperature` and
//!   `magnetic_field`.
//!
//! Every reporting sensor writes one row per hour on 2016-01-01, plus two
//! `temperature` rows just outside that day to exercise window bounds.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value, json};

use crate::domain::{
    Feature, FeatureName, FeatureProperty, GeoPoint, Network, NetworkName, Node, NodeId,
    ObservationRow, ObservedPropertyDef, PropertyType, SensorCatalog, SensorName, Sensor,
};
use crate::outbound::memory::{InMemoryObservationWarehouse, InMemorySensorCatalog};

pub const CHICAGO: &str = "array_of_things_chicago";
pub const DENVER: &str = "array_of_things_denver";

pub const NODE_LOOP: &str = "0000001e0610ba72";
pub const NODE_SOUTH: &str = "0000001e0610b9fd";
pub const NODE_OHARE: &str = "0000001e0610ee41";
pub const NODE_DENVER: &str = "denver_01";

/// Rows per hour in the Chicago `temperature` table.
pub const CHICAGO_TEMPERATURE_ROWS_PER_HOUR: u64 = 5;

/// Metadata collections as the repository would return them.
#[derive(Debug, Clone)]
pub struct CatalogSeed {
    pub networks: Vec<Network>,
    pub nodes: Vec<Node>,
    pub sensors: Vec<Sensor>,
    pub features: Vec<Feature>,
}

/// `2016-01-01T{hour}:{minute}:00`.
pub fn jan_first(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 1, 1)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .unwrap_or_else(|| panic!("invalid fixture time {hour}:{minute}"))
}

fn network(name: &str, info: Value) -> Network {
    Network {
        name: parse(name),
        info,
    }
}

fn node(id: &str, network: &str, lat: f64, lng: f64, sensors: &[&str]) -> Node {
    Node {
        id: parse(id),
        network: parse(network),
        location: GeoPoint::new(lat, lng).unwrap_or_else(|err| panic!("{err}")),
        sensors: sensors.iter().map(|s| parse(s)).collect(),
        info: json!({ "address": format!("{id} fixture site") }),
    }
}

fn sensor(name: &str, properties: &[(&str, &str)]) -> Sensor {
    Sensor {
        name: parse(name),
        observed_properties: properties
            .iter()
            .map(|(raw, dotted)| ((*raw).to_owned(), parse::<FeatureProperty>(dotted)))
            .collect(),
        info: json!({ "manufacturer": "fixture" }),
    }
}

fn feature(name: &str, properties: &[(&str, PropertyType)], networks: &[&str]) -> Feature {
    Feature {
        name: parse(name),
        observed_properties: properties
            .iter()
            .map(|(prop, ty)| ObservedPropertyDef {
                name: (*prop).to_owned(),
                property_type: *ty,
            })
            .collect(),
        networks: networks.iter().map(|n| parse(n)).collect(),
    }
}

fn parse<T>(raw: &str) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .unwrap_or_else(|err| panic!("invalid fixture value {raw}: {err}"))
}

pub fn chicago_seed() -> CatalogSeed {
    CatalogSeed {
        networks: vec![
            network(CHICAGO, json!({ "city": "Chicago" })),
            network(DENVER, json!({ "city": "Denver" })),
        ],
        nodes: vec![
            node(NODE_SOUTH, CHICAGO, 41.7508, -87.7120, &["tmp112", "bmp180"]),
            node(NODE_LOOP, CHICAGO, 41.8781, -87.6298, &["tmp112", "htu21d", "camera"]),
            node(NODE_OHARE, CHICAGO, 41.9742, -87.9073, &["htu21d", "chemsense"]),
            node(NODE_DENVER, DENVER, 39.7392, -104.9903, &["tmp112", "hmc5883l"]),
        ],
        sensors: vec![
            sensor(
                "bmp180",
                &[
                    ("pressure", "atmospheric_pressure.pressure"),
                    ("temperature", "temperature.temperature"),
                ],
            ),
            sensor("camera", &[("label", "image.label")]),
            sensor("chemsense", &[("co", "gas_concentration.co")]),
            sensor("hmc5883l", &[("x", "magnetic_field.x"), ("y", "magnetic_field.y")]),
            sensor(
                "htu21d",
                &[
                    ("humidity", "relative_humidity.humidity"),
                    ("temperature", "temperature.temperature"),
                ],
            ),
            sensor("tmp112", &[("temperature", "temperature.temperature")]),
        ],
        features: vec![
            feature("atmospheric_pressure", &[("pressure", PropertyType::Float)], &[CHICAGO]),
            feature("gas_concentration", &[("co", PropertyType::Float)], &[CHICAGO]),
            feature("image", &[("label", PropertyType::String)], &[CHICAGO]),
            feature(
                "magnetic_field",
                &[("x", PropertyType::Float), ("y", PropertyType::Float)],
                &[DENVER],
            ),
            feature("relative_humidity", &[("humidity", PropertyType::Float)], &[CHICAGO]),
            feature(
                "temperature",
                &[("temperature", PropertyType::Float)],
                &[CHICAGO, DENVER],
            ),
        ],
    }
}

fn row(node: &str, sensor: &str, datetime: NaiveDateTime, values: Value) -> ObservationRow {
    ObservationRow {
        node_id: node.to_owned(),
        datetime,
        meta_id: Some(1.0),
        sensor: sensor.to_owned(),
        values: values.as_object().cloned().unwrap_or_else(Map::new),
        row_key: 0,
    }
}

/// Tables keyed by name: `(columns, rows)`.
pub fn chicago_tables() -> BTreeMap<String, (Vec<String>, Vec<ObservationRow>)> {
    let key = ["node_id", "datetime", "meta_id", "sensor"];
    let columns = |props: &[&str]| -> Vec<String> {
        key.iter().chain(props.iter()).map(|c| (*c).to_owned()).collect()
    };
    let mut tables = BTreeMap::new();

    let mut temperature = Vec::new();
    let mut humidity = Vec::new();
    let mut pressure = Vec::new();
    let mut image = Vec::new();
    let mut magnetic = Vec::new();
    for hour in 0..24 {
        let at = jan_first(hour, 0);
        let base = f64::from(hour) * 0.5;
        temperature.push(row(NODE_OHARE, "htu21d", at, json!({ "temperature": 18.0 + base })));
        temperature.push(row(NODE_SOUTH, "tmp112", at, json!({ "temperature": 20.0 + base })));
        temperature.push(row(NODE_SOUTH, "bmp180", at, json!({ "temperature": 20.5 + base })));
        temperature.push(row(NODE_LOOP, "tmp112", at, json!({ "temperature": 21.0 + base })));
        temperature.push(row(NODE_LOOP, "htu21d", at, json!({ "temperature": 21.5 + base })));
        temperature.push(row(NODE_DENVER, "tmp112", at, json!({ "temperature": 5.0 + base })));
        humidity.push(row(NODE_LOOP, "htu21d", at, json!({ "humidity": 40.0 + base })));
        humidity.push(row(NODE_OHARE, "htu21d", at, json!({ "humidity": 45.0 + base })));
        pressure.push(row(NODE_SOUTH, "bmp180", at, json!({ "pressure": 1013.0 + base })));
        image.push(row(NODE_LOOP, "camera", at, json!({ "label": "clear" })));
        magnetic.push(row(NODE_DENVER, "hmc5883l", at, json!({ "x": base, "y": -base })));
    }
    // newest first on disk
    temperature.reverse();
    let day_before = NaiveDate::from_ymd_opt(2015, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .unwrap_or_else(|| panic!("invalid fixture time"));
    let day_after = NaiveDate::from_ymd_opt(2016, 1, 2)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_else(|| panic!("invalid fixture time"));
    temperature.push(row(NODE_LOOP, "tmp112", day_before, json!({ "temperature": -1.0 })));
    temperature.push(row(NODE_LOOP, "tmp112", day_after, json!({ "temperature": -2.0 })));

    tables.insert("temperature".to_owned(), (columns(&["temperature"]), temperature));
    tables.insert("relative_humidity".to_owned(), (columns(&["humidity"]), humidity));
    tables.insert("atmospheric_pressure".to_owned(), (columns(&["pressure"]), pressure));
    tables.insert("image".to_owned(), (columns(&["label"]), image));
    tables.insert("magnetic_field".to_owned(), (columns(&["x", "y"]), magnetic));
    tables
}

pub fn chicago_catalog_repository() -> InMemorySensorCatalog {
    let seed = chicago_seed();
    InMemorySensorCatalog::new(seed.networks, seed.nodes, seed.sensors, seed.features)
}

pub fn chicago_catalog() -> SensorCatalog {
    SensorCatalog::new(Arc::new(chicago_catalog_repository()))
}

pub fn chicago_warehouse() -> InMemoryObservationWarehouse {
    let warehouse = InMemoryObservationWarehouse::default();
    for (name, (columns, rows)) in chicago_tables() {
        warehouse.create_table(&name, columns, rows);
    }
    warehouse
}

pub fn network_name(raw: &str) -> NetworkName {
    parse(raw)
}

pub fn node_id(raw: &str) -> NodeId {
    parse(raw)
}

pub fn sensor_name(raw: &str) -> SensorName {
    parse(raw)
}

pub fn feature_name(raw: &str) -> FeatureName {
    parse(raw)
}
