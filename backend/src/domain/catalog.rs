//! Metadata catalog: network, node, sensor and feature relationships.
//!
//! [`SensorCatalog`] loads a [`NetworkView`] per request from the metadata
//! repository. The view answers every lookup the planner, the aggregation
//! service and the metadata endpoints need without further I/O, except node
//! resolution with a geometry filter which is pushed down to the repository.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::ports::{NodeFilter, SensorCatalogRepository, SensorCatalogRepositoryError};
use super::{Error, Feature, FeatureName, Network, NetworkName, Node, NodeId, Sensor, SensorName};

/// Everything the catalog knows about one network.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkView {
    pub network: Network,
    /// Nodes of the network, ordered by id.
    pub nodes: Vec<Node>,
    /// Sensors attached to at least one node of the network, ordered by name.
    pub sensors: Vec<Sensor>,
    /// Features reported by those sensors, ordered by name.
    pub features: Vec<Feature>,
}

/// Network metadata as returned by `GET /sensor-networks`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NetworkSummary {
    pub name: NetworkName,
    pub features_of_interest: Vec<FeatureName>,
    pub nodes: Vec<NodeId>,
    pub sensors: Vec<SensorName>,
    pub info: Value,
}

impl NetworkView {
    pub fn name(&self) -> &NetworkName {
        &self.network.name
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn sensor(&self, name: &SensorName) -> Option<&Sensor> {
        self.sensors.iter().find(|sensor| &sensor.name == name)
    }

    pub fn feature(&self, name: &FeatureName) -> Option<&Feature> {
        self.features.iter().find(|feature| &feature.name == name)
    }

    /// Names of every sensor in the network.
    pub fn sensor_names(&self) -> Vec<SensorName> {
        self.sensors.iter().map(|sensor| sensor.name.clone()).collect()
    }

    /// Names of every feature reported in the network.
    pub fn feature_names(&self) -> BTreeSet<FeatureName> {
        self.features.iter().map(|feature| feature.name.clone()).collect()
    }

    /// Sensors in the network that report on `feature`.
    pub fn sensors_for_feature(&self, feature: &FeatureName) -> Vec<&Sensor> {
        self.sensors
            .iter()
            .filter(|sensor| sensor.reports_on(feature))
            .collect()
    }

    /// Sensors attached to node `id`.
    pub fn sensors_on_node(&self, id: &NodeId) -> Vec<&Sensor> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        self.sensors
            .iter()
            .filter(|sensor| node.sensors.contains(&sensor.name))
            .collect()
    }

    /// Features reported by any of `sensors`.
    pub fn features_for_sensors(&self, sensors: &[SensorName]) -> BTreeSet<FeatureName> {
        self.sensors
            .iter()
            .filter(|sensor| sensors.contains(&sensor.name))
            .flat_map(Sensor::features)
            .collect()
    }

    pub fn summary(&self) -> NetworkSummary {
        NetworkSummary {
            name: self.network.name.clone(),
            features_of_interest: self.feature_names().into_iter().collect(),
            nodes: self.node_ids(),
            sensors: self.sensor_names(),
            info: self.network.info.clone(),
        }
    }

    /// Names in `requested` that the network does not know, rendered for
    /// validation messages.
    pub fn unknown_nodes<'a>(&self, requested: &'a [NodeId]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|id| self.node(id).is_none())
            .map(NodeId::as_str)
            .collect()
    }

    pub fn unknown_sensors<'a>(&self, requested: &'a [SensorName]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|name| self.sensor(name).is_none())
            .map(SensorName::as_str)
            .collect()
    }

    pub fn unknown_features<'a>(&self, requested: &'a [FeatureName]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|name| self.feature(name).is_none())
            .map(FeatureName::as_str)
            .collect()
    }
}

/// Catalog service over the metadata repository.
#[derive(Clone)]
pub struct SensorCatalog {
    repo: Arc<dyn SensorCatalogRepository>,
}

impl SensorCatalog {
    pub fn new(repo: Arc<dyn SensorCatalogRepository>) -> Self {
        Self { repo }
    }

    /// Every network with its derived metadata.
    pub async fn networks(&self) -> Result<Vec<NetworkView>, Error> {
        let networks = self.repo.list_networks().await.map_err(map_repo_error)?;
        let sensors = self.repo.list_sensors().await.map_err(map_repo_error)?;
        let features = self.repo.list_features().await.map_err(map_repo_error)?;
        let mut views = Vec::with_capacity(networks.len());
        for network in networks {
            let nodes = self
                .repo
                .list_nodes(&NodeFilter::network(network.name.clone()))
                .await
                .map_err(map_repo_error)?;
            views.push(assemble(network, nodes, &sensors, &features));
        }
        Ok(views)
    }

    /// Load one network, or `None` when it does not exist.
    pub async fn view(&self, name: &NetworkName) -> Result<Option<NetworkView>, Error> {
        let networks = self.repo.list_networks().await.map_err(map_repo_error)?;
        let Some(network) = networks.into_iter().find(|network| &network.name == name) else {
            debug!(network = %name, "network not found in catalog");
            return Ok(None);
        };
        let nodes = self
            .repo
            .list_nodes(&NodeFilter::network(name.clone()))
            .await
            .map_err(map_repo_error)?;
        let sensors = self.repo.list_sensors().await.map_err(map_repo_error)?;
        let features = self.repo.list_features().await.map_err(map_repo_error)?;
        Ok(Some(assemble(network, nodes, &sensors, &features)))
    }

    /// Like [`SensorCatalog::view`] but unknown networks are a validation error.
    pub async fn require_view(&self, name: &NetworkName) -> Result<NetworkView, Error> {
        self.view(name)
            .await?
            .ok_or_else(|| Error::invalid_request(format!("Invalid network name: {name}")))
    }

    /// Node ids matching `filter`; an all-`None` filter yields every node.
    pub async fn resolve_node_ids(&self, filter: &NodeFilter) -> Result<Vec<NodeId>, Error> {
        let nodes = self.repo.list_nodes(filter).await.map_err(map_repo_error)?;
        Ok(nodes.into_iter().map(|node| node.id).collect())
    }

    /// Nodes matching `filter`.
    pub async fn nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, Error> {
        self.repo.list_nodes(filter).await.map_err(map_repo_error)
    }
}

fn assemble(network: Network, nodes: Vec<Node>, sensors: &[Sensor], features: &[Feature]) -> NetworkView {
    let attached: BTreeSet<&SensorName> = nodes.iter().flat_map(|node| node.sensors.iter()).collect();
    let sensors: Vec<Sensor> = sensors
        .iter()
        .filter(|sensor| attached.contains(&sensor.name))
        .cloned()
        .collect();
    let reported: BTreeSet<FeatureName> = sensors.iter().flat_map(Sensor::features).collect();
    let features = features
        .iter()
        .filter(|feature| reported.contains(&feature.name))
        .cloned()
        .collect();
    NetworkView {
        network,
        nodes,
        sensors,
        features,
    }
}

pub(crate) fn map_repo_error(error: SensorCatalogRepositoryError) -> Error {
    match error {
        SensorCatalogRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("sensor metadata unavailable: {message}"))
        }
        SensorCatalogRepositoryError::Query { message } => {
            Error::internal(format!("sensor metadata query failed: {message}"))
        }
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
