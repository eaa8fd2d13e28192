//! Tests for the metadata endpoints and their response cache.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{App, test as actix_test, web};
use rstest::rstest;
use serde_json::{Value, json};

use crate::domain::ports::{MockResponseCache, ResponseCache, ResponseCacheError};
use crate::inbound::http::routes;
use crate::test_support::http::{FixtureServicesBuilder, fixture_services};
use crate::test_support::sensor_network::{CHICAGO, DENVER, NODE_LOOP, NODE_OHARE, NODE_SOUTH};

async fn get_with(state: crate::inbound::http::state::HttpState, uri: &str) -> (StatusCode, Value) {
    let app = actix_test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes),
    )
    .await;
    let request = actix_test::TestRequest::get().uri(uri).to_request();
    let response = actix_test::call_service(&app, request).await;
    let status = response.status();
    let body = actix_test::read_body_json(response).await;
    (status, body)
}

async fn get(uri: &str) -> (StatusCode, Value) {
    get_with(fixture_services().state, uri).await
}

fn names(objects: &Value, key: &str) -> Vec<String> {
    objects
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.pointer(key).and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[rstest]
#[actix_web::test]
async fn networks_list_their_derived_metadata() {
    let (status, body) = get("/sensor-networks").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"], json!({ "status": "ok", "message": "", "query": {} }));
    assert_eq!(names(&body["objects"], "/name"), vec![CHICAGO, DENVER]);
    let chicago = &body["objects"][0];
    assert_eq!(
        chicago["features_of_interest"],
        json!([
            "atmospheric_pressure",
            "gas_concentration",
            "image",
            "relative_humidity",
            "temperature"
        ])
    );
    assert_eq!(chicago["nodes"], json!([NODE_SOUTH, NODE_LOOP, NODE_OHARE]));
    assert_eq!(
        chicago["sensors"],
        json!(["bmp180", "camera", "chemsense", "htu21d", "tmp112"])
    );
    assert_eq!(chicago["info"], json!({ "city": "Chicago" }));
}

#[rstest]
#[actix_web::test]
async fn network_names_are_case_insensitive() {
    let (status, body) = get("/sensor-networks/Array_Of_Things_Denver").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["query"], json!({ "network_name": DENVER }));
    assert_eq!(body["objects"][0]["features_of_interest"], json!(["magnetic_field", "temperature"]));
}

#[rstest]
#[actix_web::test]
async fn unknown_networks_are_rejected_with_the_envelope() {
    let (status, body) = get("/sensor-networks/atlantis").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["meta"]["status"], "error");
    assert_eq!(body["meta"]["message"], "Invalid network name: atlantis");
    assert_eq!(body["meta"]["query"], json!({ "network_name": "atlantis" }));
    assert_eq!(body["objects"], json!([]));
}

#[rstest]
#[actix_web::test]
async fn nodes_are_geojson_features() {
    let (status, body) = get(&format!("/sensor-networks/{CHICAGO}/nodes/{NODE_LOOP}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["objects"][0],
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [41.8781, -87.6298] },
            "properties": {
                "id": NODE_LOOP,
                "network_name": CHICAGO,
                "sensors": ["tmp112", "htu21d", "camera"],
                "info": { "address": format!("{NODE_LOOP} fixture site") }
            }
        })
    );
}

#[rstest]
#[actix_web::test]
async fn node_lists_honour_the_polygon_filter() {
    // Roughly the Loop; excludes the south side and O'Hare.
    let polygon = r#"{"type":"Polygon","coordinates":[[[-87.70,41.85],[-87.60,41.85],[-87.60,41.90],[-87.70,41.90],[-87.70,41.85]]]}"#;
    let uri = format!(
        "/sensor-networks/{CHICAGO}/nodes?location_geom__within={}",
        url::form_urlencoded::byte_serialize(polygon.as_bytes()).collect::<String>()
    );

    let (status, body) = get(&uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body["objects"], "/properties/id"), vec![NODE_LOOP]);
    assert_eq!(body["meta"]["query"]["location_geom__within"], polygon);
}

#[rstest]
#[actix_web::test]
async fn malformed_polygons_are_field_errors() {
    let uri = format!("/sensor-networks/{CHICAGO}/nodes?location_geom__within=%7Bnope");

    let (status, body) = get(&uri).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "location_geom__within");
    assert_eq!(body["meta"]["query"]["location_geom__within"], "{nope");
}

#[rstest]
#[case("/nodes/ffffffffffffffff", "Invalid node id: ffffffffffffffff")]
#[case("/features-of-interest/wind", "Invalid feature of interest: wind")]
#[case("/sensors/lidar", "Invalid sensor name: lidar")]
#[actix_web::test]
async fn unknown_members_are_rejected(#[case] suffix: &str, #[case] message: &str) {
    let (status, body) = get(&format!("/sensor-networks/{CHICAGO}{suffix}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["meta"]["message"], message);
}

#[rstest]
#[actix_web::test]
async fn features_are_limited_to_the_network() {
    let (status, body) = get(&format!("/sensor-networks/{DENVER}/features-of-interest")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body["objects"], "/name"), vec!["magnetic_field", "temperature"]);
    assert_eq!(
        body["objects"][0]["observed_properties"],
        json!([{ "name": "x", "type": "float" }, { "name": "y", "type": "float" }])
    );
}

#[rstest]
#[case("", &["bmp180", "camera", "chemsense", "htu21d", "tmp112"])]
#[case("?feature=temperature", &["bmp180", "htu21d", "tmp112"])]
#[case("?node_id=0000001E0610EE41", &["chemsense", "htu21d"])]
#[case("?feature=temperature&node_id=0000001e0610b9fd", &["bmp180", "tmp112"])]
#[actix_web::test]
async fn sensor_lists_apply_their_filters(#[case] query: &str, #[case] expected: &[&str]) {
    let (status, body) = get(&format!("/sensor-networks/{CHICAGO}/sensors{query}")).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(names(&body["objects"], "/name"), expected);
}

#[rstest]
#[actix_web::test]
async fn sensors_map_raw_keys_to_feature_properties() {
    let (_, body) = get(&format!("/sensor-networks/{CHICAGO}/sensors/HTU21D")).await;

    assert_eq!(
        body["objects"][0]["observed_properties"],
        json!({
            "humidity": "relative_humidity.humidity",
            "temperature": "temperature.temperature"
        })
    );
    assert_eq!(body["meta"]["query"]["sensor"], "HTU21D");
}

#[rstest]
#[actix_web::test]
async fn sensor_filters_reject_foreign_nodes() {
    let (status, body) = get(&format!("/sensor-networks/{CHICAGO}/sensors?node_id=denver_01")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["meta"]["message"], "Invalid node id: denver_01");
}

#[rstest]
#[actix_web::test]
async fn cached_bodies_are_served_verbatim() {
    let cached = json!({ "meta": { "status": "ok" }, "objects": ["from cache"] });
    let body = cached.to_string();
    let mut cache = MockResponseCache::new();
    cache
        .expect_get()
        .times(1)
        .returning(move |_| Ok(Some(body.clone())));
    cache.expect_put().never();
    let services = FixtureServicesBuilder::default()
        .cache(Arc::new(cache) as Arc<dyn ResponseCache>)
        .build();

    let (status, served) = get_with(services.state, "/sensor-networks").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, cached);
}

#[rstest]
#[actix_web::test]
async fn cache_failures_fall_back_to_the_catalog() {
    let mut cache = MockResponseCache::new();
    cache
        .expect_get()
        .returning(|_| Err(ResponseCacheError::backend("connection reset")));
    cache
        .expect_put()
        .times(1)
        .returning(|_, _| Err(ResponseCacheError::backend("connection reset")));
    let services = FixtureServicesBuilder::default()
        .cache(Arc::new(cache) as Arc<dyn ResponseCache>)
        .build();

    let (status, body) = get_with(services.state, &format!("/sensor-networks/{DENVER}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["objects"][0]["name"], DENVER);
}

#[rstest]
#[actix_web::test]
async fn failures_are_never_cached() {
    let mut cache = MockResponseCache::new();
    cache.expect_get().returning(|_| Ok(None));
    cache.expect_put().never();
    let services = FixtureServicesBuilder::default()
        .cache(Arc::new(cache) as Arc<dyn ResponseCache>)
        .build();

    let (status, _) = get_with(services.state, "/sensor-networks/atlantis").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
