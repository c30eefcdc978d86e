/// Row Count Module
///
/// Counts the rows a chunked export is about to page through.

use crate::core::db::Database;
use crate::core::{DshError, Result};
use tracing::debug;

/// Builds the aggregate statement; an empty filter counts the whole table.
pub fn count_statement(table: &str, filter: Option<&str>) -> String {
    let mut sql = format!("SELECT COUNT(*) FROM {table}");
    if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    sql
}

/// Counts rows in `table` with a single aggregate statement.
///
/// # Errors
///
/// Propagates the engine's error verbatim; returns `DshError::Decode` if the
/// engine answers with something other than a non-negative integer.
pub fn count<D: Database + ?Sized>(db: &mut D, table: &str, filter: Option<&str>) -> Result<u64> {
    let sql = count_statement(table, filter);
    debug!(%sql, "Counting rows");
    let batch = db.query_data(&sql)?;
    let value = batch
        .scalar()
        .ok_or_else(|| DshError::Decode("COUNT(*) returned no rows".to_string()))?;
    // MySQL and Postgres report COUNT(*) as BIGINT, some drivers as NUMERIC text.
    let total = match value.as_i64() {
        Some(n) => u64::try_from(n).ok(),
        None => value.as_str().and_then(|s| s.trim().parse::<u64>().ok()),
    };
    total.ok_or_else(|| DshError::Decode(format!("COUNT(*) returned non-integer value {value}")))
}
