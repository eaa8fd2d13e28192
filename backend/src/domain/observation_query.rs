//! Observation query service: plan, fan out, merge.

use tracing::info;

use super::{Error, FanOutExecutor, ObservationQueryPlanner, ObservationRecord, QueryPlan};
use super::{ObservationRequest, SensorCatalog};

/// Merged answer to one observation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQueryResult {
    pub plan: QueryPlan,
    /// Records from every planned table, ordered by `datetime`.
    pub records: Vec<ObservationRecord>,
}

/// Answers interactive observation queries.
#[derive(Clone)]
pub struct ObservationQueryService {
    planner: ObservationQueryPlanner,
    executor: FanOutExecutor,
}

impl ObservationQueryService {
    pub fn new(planner: ObservationQueryPlanner, executor: FanOutExecutor) -> Self {
        Self { planner, executor }
    }

    pub fn catalog(&self) -> &SensorCatalog {
        self.planner.catalog()
    }

    pub fn planner(&self) -> &ObservationQueryPlanner {
        &self.planner
    }

    /// Run `request`; any planning error aborts before warehouse reads start.
    pub async fn query(&self, request: &ObservationRequest) -> Result<ObservationQueryResult, Error> {
        let plan = self.planner.plan(request).await?;
        let records = self.executor.execute(&plan).await?;
        info!(
            network = %request.network,
            tables = plan.queries.len(),
            records = records.len(),
            "observation query answered"
        );
        Ok(ObservationQueryResult { plan, records })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ports::MockObservationWarehouse;
    use crate::domain::{ErrorCode, FanOutConfig, TableNaming, TimeWindow};
    use crate::test_support::sensor_network::{
        CHICAGO, CHICAGO_TEMPERATURE_ROWS_PER_HOUR, chicago_catalog, chicago_warehouse,
        feature_name, jan_first, network_name,
    };

    #[fixture]
    fn service() -> ObservationQueryService {
        let warehouse = Arc::new(chicago_warehouse());
        ObservationQueryService::new(
            ObservationQueryPlanner::new(chicago_catalog(), warehouse.clone(), TableNaming::default()),
            FanOutExecutor::new(warehouse, FanOutConfig::default()),
        )
    }

    fn temperature_request() -> ObservationRequest {
        let window = TimeWindow::new(jan_first(0, 0), jan_first(0, 0) + chrono::Duration::days(1))
            .expect("window");
        let mut request = ObservationRequest::for_network(network_name(CHICAGO), window);
        request.features = Some(vec![feature_name("temperature")]);
        request
    }

    #[rstest]
    #[tokio::test]
    async fn chicago_temperature_day_is_complete_and_ordered(service: ObservationQueryService) {
        let request = temperature_request();

        let result = service.query(&request).await.expect("query");

        let expected = usize::try_from(24 * CHICAGO_TEMPERATURE_ROWS_PER_HOUR).expect("fits");
        assert_eq!(result.records.len(), expected);
        assert!(
            result
                .records
                .iter()
                .all(|r| r.feature_of_interest == "temperature" && request.window.contains(&r.datetime))
        );
        assert!(result.records.windows(2).all(|w| w[0].datetime <= w[1].datetime));
    }

    #[rstest]
    #[tokio::test]
    async fn planning_errors_skip_the_warehouse() {
        let mut warehouse = MockObservationWarehouse::new();
        warehouse.expect_describe_table().returning(|_| Ok(None));
        warehouse.expect_fetch().never();
        let warehouse = Arc::new(warehouse);
        let service = ObservationQueryService::new(
            ObservationQueryPlanner::new(chicago_catalog(), warehouse.clone(), TableNaming::default()),
            FanOutExecutor::new(warehouse, FanOutConfig::default()),
        );

        let err = service
            .query(&temperature_request())
            .await
            .expect_err("missing table");

        assert_eq!(err.code(), ErrorCode::MissingTable);
    }
}
