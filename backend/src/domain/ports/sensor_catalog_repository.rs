//! Read-side port for sensor-network metadata.
//!
//! Adapters return whole collections; the catalog service filters them by
//! network. Node listing takes a filter so SQL adapters can push the
//! geometry containment test down to PostGIS.

use async_trait::async_trait;

use crate::domain::{Feature, GeoPolygon, Network, NetworkName, Node, NodeId, Sensor};

use super::define_port_error;

define_port_error! {
    /// Errors raised when reading sensor-network metadata.
    pub enum SensorCatalogRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "sensor metadata connection failed: {message}",
        /// Query failed during execution or row conversion.
        Query { message: String } =>
            "sensor metadata query failed: {message}",
    }
}

/// Node selection within one network.
///
/// Every populated field narrows the result; all `None` selects every node
/// of the network.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFilter {
    pub network: NetworkName,
    pub node_id: Option<NodeId>,
    pub nodes: Option<Vec<NodeId>>,
    pub within: Option<GeoPolygon>,
}

impl NodeFilter {
    pub fn network(network: NetworkName) -> Self {
        Self {
            network,
            node_id: None,
            nodes: None,
            within: None,
        }
    }

    /// In-process evaluation of the filter, for adapters without PostGIS.
    pub fn matches(&self, node: &Node) -> bool {
        node.network == self.network
            && self.node_id.as_ref().is_none_or(|id| &node.id == id)
            && self.nodes.as_ref().is_none_or(|ids| ids.contains(&node.id))
            && self
                .within
                .as_ref()
                .is_none_or(|polygon| polygon.contains(&node.location))
    }
}

/// Port for reading networks, nodes, sensors and features.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorCatalogRepository: Send + Sync {
    /// All networks ordered by name.
    async fn list_networks(&self) -> Result<Vec<Network>, SensorCatalogRepositoryError>;

    /// Nodes matching `filter`, ordered by id.
    async fn list_nodes(&self, filter: &NodeFilter)
    -> Result<Vec<Node>, SensorCatalogRepositoryError>;

    /// All sensors ordered by name.
    async fn list_sensors(&self) -> Result<Vec<Sensor>, SensorCatalogRepositoryError>;

    /// All features-of-interest ordered by name.
    async fn list_features(&self) -> Result<Vec<Feature>, SensorCatalogRepositoryError>;
}
