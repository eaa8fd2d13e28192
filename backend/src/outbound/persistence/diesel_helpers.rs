//! Shared helpers for the Diesel adapters.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

/// Extract the message carried by a pool error.
pub fn map_pool_error_message(error: PoolError) -> String {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    }
}

/// Render a Diesel error for a port error, logging the operation.
pub fn map_diesel_error_message(error: &DieselError, operation: &str) -> String {
    let error_message = error.to_string();
    debug!(%error_message, %operation, "diesel operation failed");
    error_message
}

/// Map a Diesel error onto a port's query/connection constructors.
///
/// Closed connections become connection errors; everything else is a query
/// error carrying the operation name and the database message.
pub fn map_basic_diesel_error<E, Q, C>(
    error: &DieselError,
    operation: &str,
    query: Q,
    connection: C,
) -> E
where
    Q: FnOnce(String) -> E,
    C: FnOnce(String) -> E,
{
    let message = map_diesel_error_message(error, operation);
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection(format!("{operation}: {message}"))
        }
        _ => query(format!("{operation}: {message}")),
    }
}

pub fn is_unique_violation(error: &DieselError) -> bool {
    matches!(
        error,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

/// Quote `name` as a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Convert a count or bound to the `BIGINT` bind type, saturating.
pub fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Convert a part number to the `INTEGER` column type, saturating.
pub fn to_integer(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
