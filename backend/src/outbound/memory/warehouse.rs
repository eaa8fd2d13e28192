//! In-process observation warehouse.
//!
//! Mirrors the SQL adapter's semantics: half-open windows, case-insensitive
//! node and sensor membership, page order `(datetime, node_id, sensor,
//! meta_id, row_key)` and `date_trunc` bucketing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{Map, Number, Value};

use crate::domain::ports::{
    AggregateQuery, AggregateRow, ObservationWarehouse, ObservationWarehouseError,
};
use crate::domain::{AggregateFunction, ObservationRow, TableQuery, WindowPage};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<ObservationRow>,
}

/// Feature tables held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObservationWarehouse {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
}

impl InMemoryObservationWarehouse {
    /// Create or replace `name`.
    ///
    /// Each row's `row_key` is set to its position in `rows`.
    pub fn create_table(&self, name: &str, columns: Vec<String>, rows: Vec<ObservationRow>) {
        let rows = rows
            .into_iter()
            .zip(0_u64..)
            .map(|(row, row_key)| ObservationRow { row_key, ..row })
            .collect();
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(name.to_owned(), MemoryTable { columns, rows });
        }
    }

    /// Drop `name` if present.
    pub fn drop_table(&self, name: &str) {
        if let Ok(mut tables) = self.tables.write() {
            tables.remove(name);
        }
    }

    fn with_table<T>(
        &self,
        name: &str,
        f: impl FnOnce(&MemoryTable) -> T,
    ) -> Result<T, ObservationWarehouseError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| ObservationWarehouseError::connection("warehouse lock poisoned"))?;
        let table = tables.get(name).ok_or_else(|| {
            ObservationWarehouseError::query(format!("relation \"{name}\" does not exist"))
        })?;
        Ok(f(table))
    }
}

fn matching(table: &MemoryTable, query: &TableQuery) -> Vec<ObservationRow> {
    let mut rows: Vec<ObservationRow> = table
        .rows
        .iter()
        .filter(|row| query.window.contains(&row.datetime))
        .filter(|row| {
            query
                .nodes
                .iter()
                .any(|node| node.as_str() == row.node_id.to_lowercase())
        })
        .filter(|row| {
            query
                .sensors
                .iter()
                .any(|sensor| sensor.as_str() == row.sensor.to_lowercase())
        })
        .cloned()
        .collect();
    rows.sort_by(|a, b| a.page_order(b));
    rows
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl ObservationWarehouse for InMemoryObservationWarehouse {
    async fn describe_table(
        &self,
        table: &str,
    ) -> Result<Option<Vec<String>>, ObservationWarehouseError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| ObservationWarehouseError::connection("warehouse lock poisoned"))?;
        Ok(tables.get(table).map(|t| t.columns.clone()))
    }

    async fn fetch(&self, query: &TableQuery) -> Result<Vec<ObservationRow>, ObservationWarehouseError> {
        self.with_table(&query.table.name, |table| {
            let rows = matching(table, query).into_iter().skip(to_usize(query.offset));
            match query.limit {
                Some(limit) => rows.take(to_usize(limit)).collect(),
                None => rows.collect(),
            }
        })
    }

    async fn fetch_window(
        &self,
        query: &TableQuery,
        page: &WindowPage,
    ) -> Result<Vec<ObservationRow>, ObservationWarehouseError> {
        self.with_table(&query.table.name, |table| {
            matching(table, query)
                .into_iter()
                .filter(|row| {
                    page.after
                        .as_ref()
                        .is_none_or(|cursor| cursor.cmp_row(row).is_gt())
                })
                .skip(to_usize(page.offset))
                .take(to_usize(page.size))
                .collect()
        })
    }

    async fn count(&self, query: &TableQuery) -> Result<u64, ObservationWarehouseError> {
        self.with_table(&query.table.name, |table| {
            let total = u64::try_from(matching(table, query).len()).unwrap_or(u64::MAX);
            let remaining = total.saturating_sub(query.offset);
            query.limit.map_or(remaining, |limit| remaining.min(limit))
        })
    }

    async fn aggregate(
        &self,
        query: &AggregateQuery,
    ) -> Result<Vec<AggregateRow>, ObservationWarehouseError> {
        self.with_table(&query.table, |table| {
            let mut buckets: BTreeMap<NaiveDateTime, Vec<&ObservationRow>> = BTreeMap::new();
            for row in &table.rows {
                let in_scope = query.window.contains(&row.datetime)
                    && row.node_id.to_lowercase() == query.node.as_str()
                    && query
                        .sensors
                        .iter()
                        .any(|sensor| sensor.as_str() == row.sensor.to_lowercase());
                if in_scope {
                    buckets
                        .entry(query.interval.truncate(row.datetime))
                        .or_default()
                        .push(row);
                }
            }
            buckets
                .into_iter()
                .map(|(bucket, rows)| AggregateRow {
                    bucket,
                    count: u64::try_from(rows.len()).unwrap_or(u64::MAX),
                    values: aggregate_properties(query, &rows),
                })
                .collect()
        })
    }
}

fn aggregate_properties(query: &AggregateQuery, rows: &[&ObservationRow]) -> Map<String, Value> {
    query
        .properties
        .iter()
        .map(|property| {
            let present = rows
                .iter()
                .filter_map(|row| row.values.get(property))
                .filter(|value| !value.is_null());
            let value = if query.function == AggregateFunction::Count {
                Value::from(present.count())
            } else {
                let numbers: Vec<f64> = present.filter_map(Value::as_f64).collect();
                query
                    .function
                    .apply(&numbers)
                    .and_then(Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            };
            (property.clone(), value)
        })
        .collect()
}
