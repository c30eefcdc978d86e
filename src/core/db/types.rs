/// Introspection Types Module
///
/// Descriptors produced by schema introspection and session listing.
/// None of these are persisted; they are rebuilt on every call.

use crate::core::db::value::{RecordBatch, Value};
use std::fmt;
use std::time::Duration;

/// A table as reported by the engine's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Schema name; empty for engines without schemas
    pub schema: String,
    pub name: String,
    /// Engine-internal catalog table
    pub is_system: bool,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Table {
            schema: schema.into(),
            name: name.into(),
            is_system: false,
        }
    }

    pub fn system(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Table {
            is_system: true,
            ..Table::new(schema, name)
        }
    }
}

/// Target of a foreign key plus its cascade rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRef {
    pub table: String,
    /// Empty when the engine does not name the referenced column
    pub column: String,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

impl fmt::Display for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.column.is_empty() {
            write!(f, "{}", self.table)
        } else {
            write!(f, "{}({})", self.table, self.column)
        }
    }
}

/// Represents a table column with its metadata.
///
/// Constraint fields are `None` when the adapter could not determine them;
/// callers must read that as "unknown", not as "false".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Engine-native type name, not normalized
    pub type_name: String,
    pub is_nullable: Option<bool>,
    /// Default value expression, if any
    pub default: Option<String>,
    pub is_primary: Option<bool>,
    pub foreign: Option<ForeignRef>,
}

impl Column {
    /// A column with only name and type known.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            type_name: type_name.into(),
            is_nullable: None,
            default: None,
            is_primary: None,
            foreign: None,
        }
    }
}

/// A live database session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub pid: i64,
    /// Time spent in the current activity
    pub duration: Duration,
    pub username: String,
    pub database: String,
    /// Active query with whitespace runs collapsed to single spaces
    pub query: String,
}

impl Process {
    pub fn new(
        pid: i64,
        duration: Duration,
        username: impl Into<String>,
        database: impl Into<String>,
        query: &str,
    ) -> Self {
        Process {
            pid,
            duration,
            username: username.into(),
            database: database.into(),
            query: normalize_whitespace(query),
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Converts fractional seconds into a duration; negative or non-finite
/// values (clock skew, NULL start times) become zero.
pub fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

fn text(value: &Value) -> String {
    value.to_text().unwrap_or_default()
}

/// Builds column descriptors from a catalog listing shaped
/// `(name, type, is_nullable, default)` and, when available, a constraint
/// listing shaped `(constraint_type, table, column, referenced_table,
/// referenced_column, update_rule, delete_rule)`.
///
/// Constraint rows are matched on table and column name. Without a
/// constraint listing, primary-key and foreign-key fields stay unknown.
pub fn columns_with_constraints(
    table: &str,
    columns: &RecordBatch,
    constraints: Option<&RecordBatch>,
) -> Vec<Column> {
    columns
        .rows()
        .iter()
        .map(|row| {
            let mut column = Column::new(text(&row[0]), text(&row[1]));
            column.is_nullable = row[2].as_bool();
            column.default = row[3].to_text();
            let Some(constraints) = constraints else {
                return column;
            };
            column.is_primary = Some(false);
            for con in constraints.rows() {
                if con[1].as_str() != Some(table) || con[2].as_str() != Some(column.name.as_str()) {
                    continue;
                }
                match con[0].as_str() {
                    Some("PRIMARY KEY") => column.is_primary = Some(true),
                    Some("FOREIGN KEY") => {
                        column.foreign = Some(ForeignRef {
                            table: text(&con[3]),
                            column: text(&con[4]),
                            on_update: con[5].to_text(),
                            on_delete: con[6].to_text(),
                        })
                    }
                    _ => {}
                }
            }
            column
        })
        .collect()
}

/// Builds process descriptors from a session listing shaped
/// `(pid, seconds, username, database, query)`. NULL fields become zero or
/// empty rather than leaking into the descriptor.
pub fn processes_from_batch(batch: &RecordBatch) -> Vec<Process> {
    batch
        .rows()
        .iter()
        .map(|row| {
            Process::new(
                row[0].as_i64().unwrap_or(0),
                duration_from_secs(row[1].as_f64().unwrap_or(0.0)),
                text(&row[2]),
                text(&row[3]),
                &text(&row[4]),
            )
        })
        .collect()
}
