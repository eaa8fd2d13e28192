//! Sensor-network metadata model.
//!
//! Networks own nodes, nodes carry sensors, and sensors declare which
//! feature-of-interest each of their raw properties belongs to. All names
//! are normalised to lower case at construction so every comparison in the
//! catalog and planner is case-insensitive.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Validation errors raised by the sensor-network model constructors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorNetworkValidationError {
    #[error("{kind} must not be empty")]
    EmptyName { kind: &'static str },
    #[error("{kind} must not contain whitespace: {value}")]
    InvalidName { kind: &'static str, value: String },
    #[error("observed property must look like <feature>.<property>: {value}")]
    InvalidFeatureProperty { value: String },
    #[error("unknown observed property type: {value}")]
    UnknownPropertyType { value: String },
    #[error("latitude/longitude out of range: ({lat}, {lng})")]
    InvalidLocation { lat: f64, lng: f64 },
    #[error("invalid GeoJSON polygon: {message}")]
    InvalidGeometry { message: String },
}

macro_rules! lowercase_name {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Normalise and validate a raw name.
            pub fn new(value: impl AsRef<str>) -> Result<Self, SensorNetworkValidationError> {
                let trimmed = value.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(SensorNetworkValidationError::EmptyName { kind: $kind });
                }
                if trimmed.chars().any(char::is_whitespace) {
                    return Err(SensorNetworkValidationError::InvalidName {
                        kind: $kind,
                        value: trimmed.to_owned(),
                    });
                }
                Ok(Self(trimmed.to_lowercase()))
            }

            /// Borrow the normalised name.
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = SensorNetworkValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = SensorNetworkValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

lowercase_name!(
    /// Network identifier, e.g. `array_of_things_chicago`.
    NetworkName,
    "network name"
);
lowercase_name!(
    /// Node identifier, unique within its network.
    NodeId,
    "node id"
);
lowercase_name!(
    /// Sensor model name, e.g. `tmp112`.
    SensorName,
    "sensor name"
);
lowercase_name!(
    /// Feature-of-interest name, e.g. `temperature`.
    FeatureName,
    "feature name"
);

/// Column type of an observed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PropertyType {
    Float,
    Double,
    String,
    Bool,
    Int,
    Integer,
}

impl PropertyType {
    /// Whether aggregate functions other than `count` apply.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::String | Self::Bool)
    }

    /// Warehouse column type backing this property.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Float | Self::Double => "double precision",
            Self::String => "text",
            Self::Bool => "boolean",
            Self::Int | Self::Integer => "bigint",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Integer => "integer",
        }
    }
}

impl std::str::FromStr for PropertyType {
    type Err = SensorNetworkValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "string" => Ok(Self::String),
            "bool" | "boolean" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "integer" => Ok(Self::Integer),
            _ => Err(SensorNetworkValidationError::UnknownPropertyType {
                value: s.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for PropertyType {
    type Error = SensorNetworkValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.as_str().to_owned()
    }
}

/// One column declared by a feature-of-interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedPropertyDef {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
}

/// Feature-of-interest with its ordered property definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: FeatureName,
    pub observed_properties: Vec<ObservedPropertyDef>,
    pub networks: BTreeSet<NetworkName>,
}

impl Feature {
    /// Properties whose type supports numeric aggregation.
    pub fn numeric_properties(&self) -> impl Iterator<Item = &ObservedPropertyDef> {
        self.observed_properties
            .iter()
            .filter(|prop| prop.property_type.is_numeric())
    }
}

/// Typed `(feature, property)` pair parsed once from a dotted key.
///
/// # Examples
/// ```
/// use sensornet::domain::FeatureProperty;
///
/// let parsed: FeatureProperty = "Temperature.temperature".parse().expect("dotted key");
/// assert_eq!(parsed.feature.as_str(), "temperature");
/// assert_eq!(parsed.property, "temperature");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureProperty {
    pub feature: FeatureName,
    pub property: String,
}

impl std::str::FromStr for FeatureProperty {
    type Err = SensorNetworkValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SensorNetworkValidationError::InvalidFeatureProperty {
            value: s.to_owned(),
        };
        let (feature, property) = s.trim().split_once('.').ok_or_else(invalid)?;
        if property.is_empty() {
            return Err(invalid());
        }
        let feature = FeatureName::new(feature).map_err(|_| invalid())?;
        Ok(Self {
            feature,
            property: property.to_lowercase(),
        })
    }
}

impl TryFrom<String> for FeatureProperty {
    type Error = SensorNetworkValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FeatureProperty> for String {
    fn from(value: FeatureProperty) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FeatureProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.feature, self.property)
    }
}

/// Sensor model and the features its raw properties report on.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub name: SensorName,
    /// Raw property name to the feature property it populates.
    pub observed_properties: BTreeMap<String, FeatureProperty>,
    pub info: Value,
}

impl Sensor {
    /// Distinct features this sensor reports on.
    pub fn features(&self) -> BTreeSet<FeatureName> {
        self.observed_properties
            .values()
            .map(|prop| prop.feature.clone())
            .collect()
    }

    /// Whether any of the sensor's properties belong to `feature`.
    pub fn reports_on(&self, feature: &FeatureName) -> bool {
        self.observed_properties
            .values()
            .any(|prop| &prop.feature == feature)
    }
}

/// WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    lat: f64,
    lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, SensorNetworkValidationError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(SensorNetworkValidationError::InvalidLocation { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }
}

/// Polygon parsed from a GeoJSON string, used for `within` node filters.
///
/// The raw text is retained so SQL adapters can hand it to PostGIS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoPolygon {
    raw: String,
    rings: Vec<Vec<(f64, f64)>>,
}

impl GeoPolygon {
    /// Parse a GeoJSON `Polygon` geometry (or a `Feature` wrapping one).
    ///
    /// # Examples
    /// ```
    /// use sensornet::domain::{GeoPoint, GeoPolygon};
    ///
    /// let square = GeoPolygon::from_geojson(
    ///     r#"{"type":"Polygon","coordinates":[[[-88,41],[-87,41],[-87,42],[-88,42],[-88,41]]]}"#,
    /// )
    /// .expect("polygon");
    /// assert!(square.contains(&GeoPoint::new(41.5, -87.5).expect("point")));
    /// ```
    pub fn from_geojson(raw: &str) -> Result<Self, SensorNetworkValidationError> {
        let invalid = |message: &str| SensorNetworkValidationError::InvalidGeometry {
            message: message.to_owned(),
        };
        let value: Value =
            serde_json::from_str(raw).map_err(|err| invalid(&err.to_string()))?;
        let geometry = match value.get("type").and_then(Value::as_str) {
            Some("Feature") => value.get("geometry").cloned().unwrap_or(Value::Null),
            _ => value,
        };
        if geometry.get("type").and_then(Value::as_str) != Some("Polygon") {
            return Err(invalid("geometry type must be Polygon"));
        }
        let coordinates = geometry
            .get("coordinates")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("missing coordinates"))?;
        let rings = coordinates
            .iter()
            .map(|ring| parse_ring(ring).ok_or_else(|| invalid("malformed linear ring")))
            .collect::<Result<Vec<_>, _>>()?;
        if rings.is_empty() {
            return Err(invalid("polygon has no rings"));
        }
        Ok(Self {
            raw: raw.to_owned(),
            rings,
        })
    }

    /// Original GeoJSON text.
    pub fn as_geojson(&self) -> &str {
        &self.raw
    }

    /// Even-odd containment test over all rings (holes subtract).
    pub fn contains(&self, point: &GeoPoint) -> bool {
        let (x, y) = (point.lng(), point.lat());
        self.rings
            .iter()
            .filter(|ring| ring_contains(ring, x, y))
            .count()
            % 2
            == 1
    }
}

impl TryFrom<String> for GeoPolygon {
    type Error = SensorNetworkValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_geojson(&value)
    }
}

impl From<GeoPolygon> for String {
    fn from(value: GeoPolygon) -> Self {
        value.raw
    }
}

fn parse_ring(ring: &Value) -> Option<Vec<(f64, f64)>> {
    let points = ring
        .as_array()?
        .iter()
        .map(|pair| {
            let pair = pair.as_array()?;
            Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
        })
        .collect::<Option<Vec<_>>>()?;
    (points.len() >= 4).then_some(points)
}

/// Even-odd ray cast; each vertex is paired with its predecessor.
fn ring_contains(ring: &[(f64, f64)], x: f64, y: f64) -> bool {
    let previous = ring.iter().cycle().skip(ring.len().saturating_sub(1));
    ring.iter()
        .zip(previous)
        .filter(|&(&(xi, yi), &(xj, yj))| {
            (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi
        })
        .count()
        % 2
        == 1
}

/// Physical sensor deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub network: NetworkName,
    pub location: GeoPoint,
    pub sensors: Vec<SensorName>,
    pub info: Value,
}

/// Named collection of nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub name: NetworkName,
    pub info: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Array_Of_Things_Chicago", "array_of_things_chicago")]
    #[case("  tmp112 ", "tmp112")]
    fn names_are_trimmed_and_lowercased(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(NetworkName::new(raw).expect("valid").as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("two words")]
    fn malformed_names_are_rejected(#[case] raw: &str) {
        assert!(NodeId::new(raw).is_err());
    }

    #[rstest]
    fn feature_property_splits_on_first_dot() {
        let parsed: FeatureProperty = "gas_concentration.co.ppm".parse().expect("valid");
        assert_eq!(parsed.feature.as_str(), "gas_concentration");
        assert_eq!(parsed.property, "co.ppm");
    }

    #[rstest]
    #[case("temperature")]
    #[case("temperature.")]
    #[case(".temperature")]
    fn feature_property_requires_both_halves(#[case] raw: &str) {
        assert!(raw.parse::<FeatureProperty>().is_err());
    }

    #[rstest]
    #[case("FLOAT", "double precision", true)]
    #[case("double", "double precision", true)]
    #[case("STRING", "text", false)]
    #[case("bool", "boolean", false)]
    #[case("INT", "bigint", true)]
    #[case("integer", "bigint", true)]
    fn property_types_map_to_columns(
        #[case] raw: &str,
        #[case] sql: &str,
        #[case] numeric: bool,
    ) {
        let ty: PropertyType = raw.parse().expect("known type");
        assert_eq!(ty.sql_type(), sql);
        assert_eq!(ty.is_numeric(), numeric);
    }

    #[rstest]
    fn sensor_reports_on_declared_features() {
        let sensor = Sensor {
            name: SensorName::new("HTU21D").expect("valid"),
            observed_properties: BTreeMap::from([
                ("temp".to_owned(), "temperature.temperature".parse().expect("valid")),
                ("humidity".to_owned(), "relative_humidity.humidity".parse().expect("valid")),
            ]),
            info: Value::Null,
        };
        let temperature = FeatureName::new("temperature").expect("valid");
        assert!(sensor.reports_on(&temperature));
        assert!(!sensor.reports_on(&FeatureName::new("pressure").expect("valid")));
        assert_eq!(sensor.features().len(), 2);
    }

    #[rstest]
    fn polygon_excludes_points_outside_and_in_holes() {
        let polygon = GeoPolygon::from_geojson(
            r#"{"type":"Feature","geometry":{"type":"Polygon","coordinates":[
                [[0,0],[10,0],[10,10],[0,10],[0,0]],
                [[4,4],[6,4],[6,6],[4,6],[4,4]]
            ]}}"#,
        )
        .expect("polygon");
        assert!(polygon.contains(&GeoPoint::new(2.0, 2.0).expect("point")));
        assert!(!polygon.contains(&GeoPoint::new(5.0, 5.0).expect("point")));
        assert!(!polygon.contains(&GeoPoint::new(20.0, 2.0).expect("point")));
    }

    #[rstest]
    #[case(8.0, 2.0, true)]
    #[case(2.0, 8.0, true)]
    #[case(8.0, 8.0, false)]
    fn concave_polygons_exclude_their_notch(
        #[case] lat: f64,
        #[case] lng: f64,
        #[case] inside: bool,
    ) {
        let polygon = GeoPolygon::from_geojson(
            r#"{"type":"Polygon","coordinates":[
                [[0,0],[10,0],[10,4],[4,4],[4,10],[0,10],[0,0]]
            ]}"#,
        )
        .expect("polygon");
        assert_eq!(polygon.contains(&GeoPoint::new(lat, lng).expect("point")), inside);
    }

    #[rstest]
    fn out_of_range_points_report_their_coordinates() {
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(SensorNetworkValidationError::InvalidLocation { lat: 91.0, lng: 0.0 })
        );
    }

    #[rstest]
    #[case(r#"{"type":"Point","coordinates":[1,2]}"#)]
    #[case("not json")]
    #[case(r#"{"type":"Polygon","coordinates":[[[0,0],[1,1]]]}"#)]
    fn polygon_rejects_other_geometries(#[case] raw: &str) {
        assert!(GeoPolygon::from_geojson(raw).is_err());
    }
}
