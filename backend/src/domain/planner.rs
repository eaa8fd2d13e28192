//! Query planner: one bounded range query per relevant feature table.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use super::observation::KEY_COLUMNS;
use super::ports::{NodeFilter, ObservationWarehouse};
use super::warehouse_errors::map_warehouse_error;
use super::{
    Error, FeatureName, FeatureTable, NetworkName, NetworkView, NodeId, ObservationRequest,
    SensorCatalog, SensorName, TableQuery,
};

/// How a feature-of-interest maps to its physical warehouse table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableNaming {
    /// The table is named after the feature, e.g. `temperature`.
    #[default]
    FeatureName,
    /// The table is named `<network>__<feature>`.
    NetworkPrefixed,
}

impl TableNaming {
    pub fn table_name(self, network: &NetworkName, feature: &FeatureName) -> String {
        match self {
            Self::FeatureName => feature.as_str().to_owned(),
            Self::NetworkPrefixed => format!("{network}__{feature}"),
        }
    }
}

impl std::str::FromStr for TableNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feature" | "feature_name" => Ok(Self::FeatureName),
            "network_prefixed" | "prefixed" => Ok(Self::NetworkPrefixed),
            other => Err(format!("unknown table naming scheme: {other}")),
        }
    }
}

/// Resolved plan for one observation request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// One query per candidate feature, ordered by feature name.
    pub queries: Vec<TableQuery>,
    pub nodes: Vec<NodeId>,
    pub sensors: Vec<SensorName>,
    pub features: Vec<FeatureName>,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Turns validated requests into [`QueryPlan`]s using the catalog and the
/// warehouse table lookup.
#[derive(Clone)]
pub struct ObservationQueryPlanner {
    catalog: SensorCatalog,
    warehouse: Arc<dyn ObservationWarehouse>,
    naming: TableNaming,
}

impl ObservationQueryPlanner {
    pub fn new(
        catalog: SensorCatalog,
        warehouse: Arc<dyn ObservationWarehouse>,
        naming: TableNaming,
    ) -> Self {
        Self {
            catalog,
            warehouse,
            naming,
        }
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    /// Plan `request`.
    ///
    /// Fails before any observation is read when a name is unknown to the
    /// catalog or a candidate feature has no table.
    pub async fn plan(&self, request: &ObservationRequest) -> Result<QueryPlan, Error> {
        let view = self.catalog.require_view(&request.network).await?;
        reject_unknown_names(&view, request)?;

        let filter = NodeFilter {
            network: request.network.clone(),
            node_id: request.node_id.clone(),
            nodes: request.nodes.clone(),
            within: request.within.clone(),
        };
        let nodes = if filter == NodeFilter::network(request.network.clone()) {
            view.node_ids()
        } else {
            self.catalog.resolve_node_ids(&filter).await?
        };

        let sensors = request.sensors.clone().unwrap_or_else(|| view.sensor_names());
        let reported = view.features_for_sensors(&sensors);
        let candidates: BTreeSet<FeatureName> = match &request.features {
            Some(requested) => requested
                .iter()
                .filter(|feature| reported.contains(feature))
                .cloned()
                .collect(),
            None => reported,
        };

        let tables = self.locate_tables(&request.network, &candidates).await?;
        let share = u64::try_from(tables.len()).unwrap_or(u64::MAX).max(1);
        let queries = tables
            .into_iter()
            .map(|table| TableQuery {
                table,
                window: request.window,
                nodes: nodes.clone(),
                sensors: sensors.clone(),
                limit: request.limit.map(|limit| limit / share),
                offset: request.offset / share,
            })
            .collect::<Vec<_>>();
        debug!(
            network = %request.network,
            tables = queries.len(),
            nodes = nodes.len(),
            sensors = sensors.len(),
            "observation query planned"
        );
        Ok(QueryPlan {
            queries,
            nodes,
            sensors,
            features: candidates.into_iter().collect(),
        })
    }

    async fn locate_tables(
        &self,
        network: &NetworkName,
        features: &BTreeSet<FeatureName>,
    ) -> Result<Vec<FeatureTable>, Error> {
        let mut tables = Vec::with_capacity(features.len());
        for feature in features {
            let name = self.naming.table_name(network, feature);
            let Some(columns) = self
                .warehouse
                .describe_table(&name)
                .await
                .map_err(|err| map_warehouse_error(&name, err))?
            else {
                warn!(table = %name, "feature table missing from warehouse");
                return Err(Error::missing_table(&name));
            };
            tables.push(FeatureTable {
                name,
                feature: feature.clone(),
                columns: columns
                    .into_iter()
                    .filter(|column| !KEY_COLUMNS.contains(&column.as_str()))
                    .collect(),
            });
        }
        Ok(tables)
    }
}

fn reject_unknown_names(view: &NetworkView, request: &ObservationRequest) -> Result<(), Error> {
    let mut details = serde_json::Map::new();
    let nodes: Vec<_> = request
        .nodes
        .iter()
        .flatten()
        .chain(request.node_id.iter())
        .cloned()
        .collect();
    let unknown_nodes = view.unknown_nodes(&nodes);
    if !unknown_nodes.is_empty() {
        details.insert("nodes".into(), json!(unknown_nodes));
    }
    if let Some(sensors) = &request.sensors {
        let unknown = view.unknown_sensors(sensors);
        if !unknown.is_empty() {
            details.insert("sensors".into(), json!(unknown));
        }
    }
    if let Some(features) = &request.features {
        let unknown = view.unknown_features(features);
        if !unknown.is_empty() {
            details.insert("features_of_interest".into(), json!(unknown));
        }
    }
    if details.is_empty() {
        return Ok(());
    }
    let fields: Vec<&str> = details.keys().map(String::as_str).collect();
    let message = format!(
        "Unknown {} for network {}",
        fields.join(", "),
        view.name()
    );
    Err(Error::invalid_request(message).with_details(serde_json::Value::Object(details)))
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
