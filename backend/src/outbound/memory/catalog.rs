//! In-process sensor metadata repository.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::domain::ports::{NodeFilter, SensorCatalogRepository, SensorCatalogRepositoryError};
use crate::domain::{Feature, Network, Node, Sensor};

#[derive(Debug, Default)]
struct CatalogData {
    networks: Vec<Network>,
    nodes: Vec<Node>,
    sensors: Vec<Sensor>,
    features: Vec<Feature>,
}

/// Metadata held in memory; geometry filters use an in-process
/// point-in-polygon test.
#[derive(Debug, Default, Clone)]
pub struct InMemorySensorCatalog {
    data: Arc<RwLock<CatalogData>>,
}

impl InMemorySensorCatalog {
    pub fn new(
        mut networks: Vec<Network>,
        mut nodes: Vec<Node>,
        mut sensors: Vec<Sensor>,
        mut features: Vec<Feature>,
    ) -> Self {
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        nodes.sort_by(|a, b| a.network.cmp(&b.network).then_with(|| a.id.cmp(&b.id)));
        sensors.sort_by(|a, b| a.name.cmp(&b.name));
        features.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            data: Arc::new(RwLock::new(CatalogData {
                networks,
                nodes,
                sensors,
                features,
            })),
        }
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&CatalogData) -> T,
    ) -> Result<T, SensorCatalogRepositoryError> {
        let guard = self
            .data
            .read()
            .map_err(|_| SensorCatalogRepositoryError::connection("catalog lock poisoned"))?;
        Ok(f(&guard))
    }
}

#[async_trait]
impl SensorCatalogRepository for InMemorySensorCatalog {
    async fn list_networks(&self) -> Result<Vec<Network>, SensorCatalogRepositoryError> {
        self.read(|data| data.networks.clone())
    }

    async fn list_nodes(
        &self,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>, SensorCatalogRepositoryError> {
        self.read(|data| {
            data.nodes
                .iter()
                .filter(|node| filter.matches(node))
                .cloned()
                .collect()
        })
    }

    async fn list_sensors(&self) -> Result<Vec<Sensor>, SensorCatalogRepositoryError> {
        self.read(|data| data.sensors.clone())
    }

    async fn list_features(&self) -> Result<Vec<Feature>, SensorCatalogRepositoryError> {
        self.read(|data| data.features.clone())
    }
}
