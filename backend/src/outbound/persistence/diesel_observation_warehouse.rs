//! PostgreSQL-backed observation warehouse adapter.
//!
//! Feature tables are created outside this service, one per
//! feature-of-interest, so their names and property columns are only known
//! at runtime. Queries are assembled from quoted identifiers and every value
//! is bound as a parameter.

use chrono::NaiveDateTime;
use diesel::QueryableByName;
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Double, Jsonb, Nullable, Text, Timestamp};
use diesel_async::RunQueryDsl;
use serde_json::{Map, Value};

use crate::domain::ports::{
    AggregateQuery, AggregateRow, ObservationWarehouse, ObservationWarehouseError,
};
use crate::domain::{AggregateFunction, ObservationCursor, ObservationRow, TableQuery, WindowPage};

use super::diesel_helpers::{
    map_basic_diesel_error, map_pool_error_message, quote_ident, to_bigint,
};
use super::pool::{DbPool, PoolError};

/// Diesel-backed implementation of [`ObservationWarehouse`].
#[derive(Clone)]
pub struct DieselObservationWarehouse {
    pool: DbPool,
}

impl DieselObservationWarehouse {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DESCRIBE_SQL: &str = r#"
SELECT column_name::text AS column_name
FROM information_schema.columns
WHERE table_schema = current_schema()
  AND table_name = $1
ORDER BY ordinal_position
"#;

#[derive(Debug, QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    column_name: String,
}

#[derive(Debug, QueryableByName)]
struct ObservationSqlRow {
    #[diesel(sql_type = Text)]
    node_id: String,
    #[diesel(sql_type = Timestamp)]
    datetime: NaiveDateTime,
    #[diesel(sql_type = Nullable<Double>)]
    meta_id: Option<f64>,
    #[diesel(sql_type = Text)]
    sensor: String,
    #[diesel(sql_type = Jsonb)]
    results: Value,
    #[diesel(sql_type = BigInt)]
    row_key: i64,
}

#[derive(Debug, QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

#[derive(Debug, QueryableByName)]
struct BucketRow {
    #[diesel(sql_type = Timestamp)]
    bucket: NaiveDateTime,
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = Jsonb)]
    results: Value,
}

/// `jsonb_build_object` over the property columns of a feature table.
fn results_expression(columns: &[String]) -> String {
    if columns.is_empty() {
        return "'{}'::jsonb".to_owned();
    }
    let pairs = columns
        .iter()
        .map(|column| format!("'{}', {}", column.replace('\'', "''"), quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("jsonb_build_object({pairs})")
}

/// `ctid` packed into a sortable integer: `block * 65536 + offset`.
///
/// Observation tables are append-only, so a row's `ctid` is stable for the
/// life of a datadump.
const ROW_KEY_SQL: &str =
    "((ctid::text::point)[0]::bigint * 65536 + (ctid::text::point)[1]::bigint)";

/// Filtered, ordered rows of one table.
///
/// Binds: `$1`/`$2` window, `$3` nodes, `$4` sensors, `$5` limit (NULL for
/// all), `$6` offset, `$7..=$11` optional keyset cursor.
fn rows_sql(table: &str, columns: &[String]) -> String {
    format!(
        r#"
SELECT
    node_id::text AS node_id,
    datetime::timestamp AS datetime,
    meta_id::float8 AS meta_id,
    sensor::text AS sensor,
    {results} AS results,
    row_key
FROM (SELECT *, {row_key} AS row_key FROM {table}) observations
WHERE datetime >= $1 AND datetime < $2
  AND lower(node_id) = ANY($3)
  AND lower(sensor) = ANY($4)
  AND ($7::timestamp IS NULL
       OR (datetime, node_id COLLATE "C", sensor COLLATE "C", coalesce(meta_id::float8, '-Infinity'::float8), row_key)
        > ($7, $8::text COLLATE "C", $9::text COLLATE "C", coalesce($10::float8, '-Infinity'::float8), $11::bigint))
ORDER BY datetime, node_id COLLATE "C", sensor COLLATE "C", meta_id NULLS FIRST, row_key
LIMIT $5 OFFSET $6
"#,
        results = results_expression(columns),
        row_key = ROW_KEY_SQL,
        table = quote_ident(table),
    )
}

fn count_sql(table: &str) -> String {
    format!(
        r#"
SELECT count(*) AS total FROM (
    SELECT 1
    FROM {table}
    WHERE datetime >= $1 AND datetime < $2
      AND lower(node_id) = ANY($3)
      AND lower(sensor) = ANY($4)
    LIMIT $5 OFFSET $6
) page
"#,
        table = quote_ident(table),
    )
}

/// Aggregate of one property column.
fn aggregate_expression(function: AggregateFunction, column: &str) -> String {
    let column = quote_ident(column);
    match function {
        AggregateFunction::Count => format!("count({column})"),
        other => format!("{}({column})::float8", other.sql_name()),
    }
}

fn aggregate_sql(query: &AggregateQuery) -> String {
    let results = if query.properties.is_empty() {
        "'{}'::jsonb".to_owned()
    } else {
        let pairs = query
            .properties
            .iter()
            .map(|property| {
                format!(
                    "'{}', {}",
                    property.replace('\'', "''"),
                    aggregate_expression(query.function, property)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("jsonb_build_object({pairs})")
    };
    format!(
        r#"
SELECT
    date_trunc('{interval}', datetime)::timestamp AS bucket,
    count(*) AS total,
    {results} AS results
FROM {table}
WHERE datetime >= $1 AND datetime < $2
  AND lower(node_id) = $3
  AND lower(sensor) = ANY($4)
GROUP BY 1
ORDER BY 1
"#,
        interval = query.interval.as_str(),
        table = quote_ident(&query.table),
    )
}

fn map_pool_error(error: PoolError) -> ObservationWarehouseError {
    ObservationWarehouseError::connection(map_pool_error_message(error))
}

fn map_diesel_error(operation: &'static str) -> impl Fn(diesel::result::Error) -> ObservationWarehouseError {
    move |error| {
        map_basic_diesel_error(
            &error,
            operation,
            ObservationWarehouseError::query,
            ObservationWarehouseError::connection,
        )
    }
}

fn into_observation(row: ObservationSqlRow) -> ObservationRow {
    let values = match row.results {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ObservationRow {
        node_id: row.node_id,
        datetime: row.datetime,
        meta_id: row.meta_id,
        sensor: row.sensor,
        values,
        row_key: count_from(row.row_key),
    }
}

fn count_from(total: i64) -> u64 {
    u64::try_from(total).unwrap_or(0)
}

fn lowered<T: AsRef<str>>(names: &[T]) -> Vec<String> {
    names.iter().map(|name| name.as_ref().to_lowercase()).collect()
}

impl DieselObservationWarehouse {
    async fn load_rows(
        &self,
        query: &TableQuery,
        limit: Option<u64>,
        offset: u64,
        after: Option<&ObservationCursor>,
    ) -> Result<Vec<ObservationRow>, ObservationWarehouseError> {
        let sql = rows_sql(&query.table.name, &query.table.columns);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ObservationSqlRow> = sql_query(sql)
            .bind::<Timestamp, _>(query.window.start())
            .bind::<Timestamp, _>(query.window.end())
            .bind::<Array<Text>, _>(lowered(&query.nodes))
            .bind::<Array<Text>, _>(lowered(&query.sensors))
            .bind::<Nullable<BigInt>, _>(limit.map(to_bigint))
            .bind::<BigInt, _>(to_bigint(offset))
            .bind::<Nullable<Timestamp>, _>(after.map(|cursor| cursor.datetime))
            .bind::<Nullable<Text>, _>(after.map(|cursor| cursor.node_id.clone()))
            .bind::<Nullable<Text>, _>(after.map(|cursor| cursor.sensor.clone()))
            .bind::<Nullable<Double>, _>(after.and_then(|cursor| cursor.meta_id))
            .bind::<Nullable<BigInt>, _>(after.map(|cursor| to_bigint(cursor.row_key)))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("fetch observations"))?;
        Ok(rows.into_iter().map(into_observation).collect())
    }
}

#[async_trait::async_trait]
impl ObservationWarehouse for DieselObservationWarehouse {
    async fn describe_table(
        &self,
        table: &str,
    ) -> Result<Option<Vec<String>>, ObservationWarehouseError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ColumnRow> = sql_query(DESCRIBE_SQL)
            .bind::<Text, _>(table)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("describe table"))?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.into_iter().map(|row| row.column_name).collect()))
    }

    async fn fetch(&self, query: &TableQuery) -> Result<Vec<ObservationRow>, ObservationWarehouseError> {
        self.load_rows(query, query.limit, query.offset, None).await
    }

    async fn fetch_window(
        &self,
        query: &TableQuery,
        page: &WindowPage,
    ) -> Result<Vec<ObservationRow>, ObservationWarehouseError> {
        self.load_rows(query, Some(page.size), page.offset, page.after.as_ref())
            .await
    }

    async fn count(&self, query: &TableQuery) -> Result<u64, ObservationWarehouseError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: CountRow = sql_query(count_sql(&query.table.name))
            .bind::<Timestamp, _>(query.window.start())
            .bind::<Timestamp, _>(query.window.end())
            .bind::<Array<Text>, _>(lowered(&query.nodes))
            .bind::<Array<Text>, _>(lowered(&query.sensors))
            .bind::<Nullable<BigInt>, _>(query.limit.map(to_bigint))
            .bind::<BigInt, _>(to_bigint(query.offset))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error("count observations"))?;
        Ok(count_from(row.total))
    }

    async fn aggregate(
        &self,
        query: &AggregateQuery,
    ) -> Result<Vec<AggregateRow>, ObservationWarehouseError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<BucketRow> = sql_query(aggregate_sql(query))
            .bind::<Timestamp, _>(query.window.start())
            .bind::<Timestamp, _>(query.window.end())
            .bind::<Text, _>(query.node.as_str())
            .bind::<Array<Text>, _>(lowered(&query.sensors))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("aggregate observations"))?;
        Ok(rows
            .into_iter()
            .map(|row| AggregateRow {
                bucket: row.bucket,
                count: count_from(row.total),
                values: match row.results {
                    Value::Object(map) => map,
                    _ => Map::new(),
                },
            })
            .collect())
    }
}
