//! Mapping of warehouse port errors into domain errors.

use super::Error;
use super::ports::ObservationWarehouseError;

pub(crate) fn map_warehouse_error(table: &str, error: ObservationWarehouseError) -> Error {
    match error {
        ObservationWarehouseError::Connection { message } => Error::service_unavailable(format!(
            "observation warehouse unavailable while reading {table}: {message}"
        )),
        ObservationWarehouseError::Query { .. } => {
            Error::internal_with_debug(&format!("query against {table} failed"), &error)
        }
    }
}
