//! Tests for observation query planning.

use rstest::{fixture, rstest};

use super::*;
use crate::domain::{ErrorCode, GeoPolygon, TimeWindow};
use crate::outbound::memory::InMemoryObservationWarehouse;
use crate::test_support::sensor_network::{
    CHICAGO, NODE_LOOP, NODE_OHARE, NODE_SOUTH, chicago_catalog, chicago_warehouse, feature_name,
    jan_first, network_name, node_id, sensor_name,
};

#[fixture]
fn planner() -> ObservationQueryPlanner {
    ObservationQueryPlanner::new(
        chicago_catalog(),
        Arc::new(chicago_warehouse()),
        TableNaming::default(),
    )
}

fn request() -> ObservationRequest {
    let window = TimeWindow::new(jan_first(0, 0), jan_first(6, 0)).expect("window");
    ObservationRequest::for_network(network_name(CHICAGO), window)
}

fn table_names(plan: &QueryPlan) -> Vec<&str> {
    plan.queries.iter().map(|q| q.table.name.as_str()).collect()
}

#[rstest]
#[tokio::test]
async fn plans_one_query_per_reported_feature(planner: ObservationQueryPlanner) {
    let mut req = request();
    req.sensors = Some(vec![sensor_name("tmp112"), sensor_name("htu21d")]);

    let plan = planner.plan(&req).await.expect("plan");

    assert_eq!(table_names(&plan), vec!["relative_humidity", "temperature"]);
    assert_eq!(plan.nodes.len(), 3);
    let temperature = &plan.queries[1];
    assert_eq!(temperature.table.columns, vec!["temperature".to_owned()]);
    assert_eq!(temperature.window, req.window);
}

#[rstest]
#[tokio::test]
async fn features_not_reported_by_the_sensors_are_dropped(planner: ObservationQueryPlanner) {
    let mut req = request();
    req.sensors = Some(vec![sensor_name("tmp112")]);
    req.features = Some(vec![feature_name("temperature"), feature_name("image")]);

    let plan = planner.plan(&req).await.expect("plan");

    assert_eq!(table_names(&plan), vec!["temperature"]);
    assert_eq!(plan.features, vec![feature_name("temperature")]);
}

#[rstest]
#[tokio::test]
async fn feature_without_table_fails_the_whole_plan(planner: ObservationQueryPlanner) {
    let err = planner.plan(&request()).await.expect_err("gas_concentration has no table");

    assert_eq!(err.code(), ErrorCode::MissingTable);
    assert_eq!(err.message(), "Table gas_concentration not found");
}

#[rstest]
#[tokio::test]
async fn unknown_names_are_listed_in_details(planner: ObservationQueryPlanner) {
    let mut req = request();
    req.nodes = Some(vec![node_id(NODE_LOOP), node_id("ghost")]);
    req.sensors = Some(vec![sensor_name("hmc5883l")]);

    let err = planner.plan(&req).await.expect_err("unknown names");

    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    let details = err.details().expect("details");
    assert_eq!(details["nodes"], serde_json::json!(["ghost"]));
    assert_eq!(details["sensors"], serde_json::json!(["hmc5883l"]));
    assert!(details.get("features_of_interest").is_none());
}

#[rstest]
#[tokio::test]
async fn unknown_networks_are_rejected(planner: ObservationQueryPlanner) {
    let mut req = request();
    req.network = network_name("atlantis");

    let err = planner.plan(&req).await.expect_err("unknown network");

    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(err.message(), "Invalid network name: atlantis");
}

#[rstest]
#[tokio::test]
async fn node_filters_narrow_every_query(planner: ObservationQueryPlanner) {
    let mut req = request();
    req.features = Some(vec![feature_name("temperature")]);
    req.node_id = Some(node_id(NODE_SOUTH));

    let plan = planner.plan(&req).await.expect("plan");

    assert_eq!(plan.nodes, vec![node_id(NODE_SOUTH)]);
    assert_eq!(plan.queries[0].nodes, vec![node_id(NODE_SOUTH)]);
}

#[rstest]
#[tokio::test]
async fn geometry_filters_keep_nodes_inside_the_polygon(planner: ObservationQueryPlanner) {
    let mut req = request();
    req.features = Some(vec![feature_name("temperature")]);
    // box around the O'Hare node only
    req.within = Some(
        GeoPolygon::from_geojson(
            r#"{"type":"Polygon","coordinates":[[[-88.0,41.9],[-87.8,41.9],[-87.8,42.0],[-88.0,42.0],[-88.0,41.9]]]}"#,
        )
        .expect("polygon"),
    );

    let plan = planner.plan(&req).await.expect("plan");

    assert_eq!(plan.nodes, vec![node_id(NODE_OHARE)]);
}

#[rstest]
#[tokio::test]
async fn limit_and_offset_are_shared_between_tables(planner: ObservationQueryPlanner) {
    let mut req = request();
    req.sensors = Some(vec![sensor_name("htu21d")]);
    req.limit = Some(101);
    req.offset = 10;

    let plan = planner.plan(&req).await.expect("plan");

    assert_eq!(plan.queries.len(), 2);
    assert!(plan.queries.iter().all(|q| q.limit == Some(50) && q.offset == 5));
}

#[rstest]
#[tokio::test]
async fn prefixed_naming_looks_up_network_tables() {
    let warehouse = InMemoryObservationWarehouse::default();
    warehouse.create_table(
        "array_of_things_chicago__temperature",
        vec!["node_id".into(), "datetime".into(), "meta_id".into(), "sensor".into(), "temperature".into()],
        vec![],
    );
    let planner = ObservationQueryPlanner::new(
        chicago_catalog(),
        Arc::new(warehouse),
        TableNaming::NetworkPrefixed,
    );
    let mut req = request();
    req.features = Some(vec![feature_name("temperature")]);

    let plan = planner.plan(&req).await.expect("plan");

    assert_eq!(table_names(&plan), vec!["array_of_things_chicago__temperature"]);
    assert_eq!(plan.queries[0].table.feature, feature_name("temperature"));
}

#[rstest]
#[case("feature", TableNaming::FeatureName)]
#[case("Network_Prefixed", TableNaming::NetworkPrefixed)]
fn naming_schemes_parse(#[case] raw: &str, #[case] expected: TableNaming) {
    assert_eq!(raw.parse::<TableNaming>(), Ok(expected));
}
