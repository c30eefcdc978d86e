/// Database Module
///
/// This module provides the uniform capability set every DSH tool programs
/// against, plus one adapter per supported engine.
///
/// ## Architecture
///
/// - **Value Model** (`value.rs`): dynamically-typed scalars and record batches
/// - **Descriptors** (`types.rs`): tables, columns, processes
/// - **Connection Strings** (`connection.rs`): scheme resolution and driver targets
/// - **Row Counting** (`count.rs`): the aggregate that seeds chunked exports
/// - **Adapters** (`sqlite.rs`, `postgres.rs`, `mysql.rs`): engine-native SQL
///
/// ## Usage
///
/// Open a database with [`open`], which selects the adapter from the
/// connection string's scheme and connects eagerly.
pub mod connection;
pub mod count;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod types;
pub mod value;

pub use connection::{Dsn, Engine};
pub use count::count;
pub use types::{Column, ForeignRef, Process, Table};
pub use value::{RecordBatch, Value};

use crate::core::Result;
use tracing::info;

/// Capabilities shared by every engine adapter.
///
/// Engines lacking a capability return `DshError::Unsupported` rather than an
/// empty success, so "no sessions" and "not supported" stay distinguishable.
pub trait Database {
    /// Engine behind this handle
    fn engine(&self) -> Engine;

    /// Executes one statement and returns its fully decoded result.
    ///
    /// Any statement, column or row failure aborts the whole batch.
    fn query_data(&mut self, sql: &str) -> Result<RecordBatch>;

    /// Lists all tables, system catalogs included and flagged.
    fn query_tables(&mut self) -> Result<Vec<Table>>;

    /// Lists the columns of `table` in declaration order.
    fn query_columns(&mut self, table: &str) -> Result<Vec<Column>>;

    /// Lists live sessions.
    fn query_processes(&mut self) -> Result<Vec<Process>>;

    /// Terminates a session.
    ///
    /// A non-forceful kill cancels the in-flight statement and leaves the
    /// session alive; a forceful kill ends the session.
    fn kill_process(&mut self, pid: i64, force: bool) -> Result<()>;

    /// Counts rows of `table`, optionally restricted by a WHERE expression.
    fn count(&mut self, table: &str, filter: Option<&str>) -> Result<u64> {
        count::count(self, table, filter)
    }
}

/// An open database: one adapter per engine, selected at runtime.
pub enum Dialect {
    Sqlite(sqlite::Sqlite),
    Postgres(postgres::Postgres),
    Mysql(mysql::Mysql),
}

impl Dialect {
    fn inner(&mut self) -> &mut dyn Database {
        match self {
            Dialect::Sqlite(db) => db,
            Dialect::Postgres(db) => db,
            Dialect::Mysql(db) => db,
        }
    }
}

impl Database for Dialect {
    fn engine(&self) -> Engine {
        match self {
            Dialect::Sqlite(_) => Engine::Sqlite,
            Dialect::Postgres(_) => Engine::Postgres,
            Dialect::Mysql(_) => Engine::Mysql,
        }
    }

    fn query_data(&mut self, sql: &str) -> Result<RecordBatch> {
        self.inner().query_data(sql)
    }

    fn query_tables(&mut self) -> Result<Vec<Table>> {
        self.inner().query_tables()
    }

    fn query_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        self.inner().query_columns(table)
    }

    fn query_processes(&mut self) -> Result<Vec<Process>> {
        self.inner().query_processes()
    }

    fn kill_process(&mut self, pid: i64, force: bool) -> Result<()> {
        self.inner().kill_process(pid, force)
    }
}

/// Opens a database from a connection string.
///
/// The underlying connection is established immediately, so connectivity
/// problems surface here rather than on first use.
///
/// # Errors
///
/// Returns `DshError::Config` for an empty, scheme-less or unsupported
/// connection string, or the driver's error if connecting fails.
pub fn open(dsn: &str) -> Result<Dialect> {
    let dsn = Dsn::parse(dsn)?;
    info!(engine = %dsn.engine(), dsn = %dsn.redacted(), "Opening database");
    match dsn.engine() {
        Engine::Sqlite => sqlite::Sqlite::open(dsn).map(Dialect::Sqlite),
        Engine::Postgres => postgres::Postgres::open(dsn).map(Dialect::Postgres),
        Engine::Mysql => mysql::Mysql::open(dsn).map(Dialect::Mysql),
    }
}
