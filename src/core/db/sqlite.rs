/// SQLite Adapter Module
///
/// Introspection through `sqlite_master` and the table-valued pragmas.
/// SQLite is an embedded, single-file engine: it has no sessions, so process
/// listing and killing fail with `DshError::Unsupported`.

use crate::core::db::connection::{Dsn, Engine};
use crate::core::db::types::{Column, ForeignRef, Process, Table};
use crate::core::db::value::{quote_literal, RecordBatch, Value};
use crate::core::db::Database;
use crate::core::{DshError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, OpenFlags, Statement};
use tracing::debug;

/// Catalog tables SQLite does not list about itself.
pub const SYSTEM_TABLES: [&str; 3] = ["sqlite_master", "sqlite_sequence", "sqlite_stat1"];

pub struct Sqlite {
    conn: Connection,
    dsn: Dsn,
}

impl Sqlite {
    /// Opens the database file named by the connection string.
    ///
    /// The schema is read once so that a path pointing at something other
    /// than a SQLite database fails here, not on the first query.
    pub fn open(dsn: Dsn) -> Result<Self> {
        let target = dsn.sqlite_target()?;
        let conn = if target.read_only {
            Connection::open_with_flags(
                &target.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
            )?
        } else {
            Connection::open(&target.path)?
        };
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))?;
        debug!(path = %target.path, read_only = target.read_only, "Opened SQLite database");
        Ok(Sqlite { conn, dsn })
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }
}

/// Maps a SQLite storage-class value into a scalar.
///
/// Text that is not valid UTF-8 is kept as bytes rather than mangled.
pub fn decode_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => Value::Bytes(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Executes every statement in `sql` on a rusqlite connection, in order.
///
/// The rows of the last statement are returned. Text holding no statement
/// yields an empty batch without columns.
pub fn query_connection(conn: &Connection, sql: &str) -> Result<RecordBatch> {
    let mut statements = Batch::new(conn, sql);
    let mut last = RecordBatch::new(Vec::new());
    let mut count = 0usize;
    while let Some(mut stmt) = statements.next()? {
        last = query_statement(&mut stmt)?;
        count += 1;
    }
    if count > 1 {
        debug!(statements = count, "Executed SQLite script");
    }
    Ok(last)
}

fn query_statement(stmt: &mut Statement<'_>) -> Result<RecordBatch> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = columns.len();
    let mut batch = RecordBatch::new(columns);

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(decode_value(row.get_ref(i)?));
        }
        batch.push_row(values)?;
    }
    Ok(batch)
}

fn text(value: &Value) -> String {
    value.to_text().unwrap_or_default()
}

impl Database for Sqlite {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn query_data(&mut self, sql: &str) -> Result<RecordBatch> {
        query_connection(&self.conn, sql)
    }

    fn query_tables(&mut self) -> Result<Vec<Table>> {
        let data = self.query_data("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let mut tables: Vec<Table> = data
            .rows()
            .iter()
            .map(|row| text(&row[0]))
            // sqlite_sequence / sqlite_stat1 show up here once created; they
            // are part of the fixed list below.
            .filter(|name| !SYSTEM_TABLES.contains(&name.as_str()))
            .map(|name| Table::new("", name))
            .collect();
        tables.extend(SYSTEM_TABLES.iter().map(|name| Table::system("", *name)));
        Ok(tables)
    }

    fn query_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let literal = quote_literal(table);
        let info = self.query_data(&format!(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info({literal})"
        ))?;
        let fks = self.query_data(&format!(
            "SELECT \"from\", \"table\", \"to\", on_update, on_delete \
             FROM pragma_foreign_key_list({literal})"
        ))?;

        let columns = info
            .rows()
            .iter()
            .map(|row| {
                let mut column = Column::new(text(&row[0]), text(&row[1]));
                column.is_nullable = row[2].as_bool().map(|not_null| !not_null);
                column.default = row[3].to_text();
                column.is_primary = row[4].as_i64().map(|pk| pk > 0);
                // Foreign key rows are matched by the referencing column name.
                column.foreign = fks
                    .rows()
                    .iter()
                    .find(|fk| fk[0].as_str() == Some(column.name.as_str()))
                    .map(|fk| ForeignRef {
                        table: text(&fk[1]),
                        column: text(&fk[2]),
                        on_update: fk[3].to_text(),
                        on_delete: fk[4].to_text(),
                    });
                column
            })
            .collect();
        Ok(columns)
    }

    fn query_processes(&mut self) -> Result<Vec<Process>> {
        Err(DshError::Unsupported(
            "sqlite doesn't support process listing, use `lsof <file>` instead".to_string(),
        ))
    }

    fn kill_process(&mut self, _pid: i64, _force: bool) -> Result<()> {
        Err(DshError::Unsupported(
            "sqlite doesn't support process killing, use `lsof <file>` + `kill` instead".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Sqlite {
        let dsn = Dsn::parse("sqlite://:memory:").unwrap();
        Sqlite::open(dsn).unwrap()
    }

    fn setup_test_schema(db: &Sqlite) -> rusqlite::Result<()> {
        db.conn.execute_batch(
            "
            CREATE TABLE customers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                tier TEXT DEFAULT 'basic'
            );
            CREATE TABLE orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id INTEGER REFERENCES customers(id) ON DELETE CASCADE,
                total REAL
            );
            INSERT INTO customers (id, name) VALUES (1, 'Ada');
            INSERT INTO orders (customer_id, total) VALUES (1, 9.5);
        ",
        )
    }

    #[test]
    fn test_decode_value_kinds() {
        assert_eq!(decode_value(ValueRef::Null), Value::Null);
        assert_eq!(decode_value(ValueRef::Integer(0)), Value::Int(0));
        assert_eq!(decode_value(ValueRef::Real(1.5)), Value::Float(1.5));
        assert_eq!(decode_value(ValueRef::Text(b"hi")), Value::Text("hi".into()));
        assert_eq!(
            decode_value(ValueRef::Text(&[0xff, 0xfe])),
            Value::Bytes(vec![0xff, 0xfe])
        );
        assert_eq!(decode_value(ValueRef::Blob(&[1, 2])), Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn test_query_data_preserves_nulls_and_order() {
        let mut db = memory_db();
        let batch = db
            .query_data("SELECT 3 AS a, NULL AS b UNION ALL SELECT 1, 'x' UNION ALL SELECT 2, 0")
            .unwrap();
        assert_eq!(batch.columns(), ["a".to_string(), "b".to_string()]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.rows()[0], vec![Value::Int(3), Value::Null]);
        assert_eq!(batch.rows()[2], vec![Value::Int(2), Value::Int(0)]);
        assert!(batch.rows().iter().all(|row| row.len() == 2));
    }

    #[test]
    fn test_query_data_error_returns_no_batch() {
        let mut db = memory_db();
        assert!(matches!(
            db.query_data("SELEC nonsense"),
            Err(DshError::Sqlite(_))
        ));
    }

    #[test]
    fn test_query_data_runs_every_statement_of_a_script() {
        let mut db = memory_db();
        let created = db
            .query_data("CREATE TABLE a (x INTEGER); INSERT INTO a VALUES (1); INSERT INTO a VALUES (2);")
            .unwrap();
        assert!(created.is_empty());

        let count = db.query_data("SELECT COUNT(*) AS n FROM a").unwrap();
        assert_eq!(count.rows()[0][0], Value::Int(2));

        // The rows of the last statement come back.
        let last = db
            .query_data("INSERT INTO a VALUES (3); SELECT x FROM a ORDER BY x DESC -- newest first")
            .unwrap();
        assert_eq!(last.columns(), ["x"]);
        assert_eq!(last.rows()[0][0], Value::Int(3));
        assert_eq!(last.len(), 3);

        // A failing statement stops the script and surfaces the error.
        assert!(db.query_data("INSERT INTO a VALUES (4); SELECT * FROM missing").is_err());
        assert!(db.query_data("   ").unwrap().columns().is_empty());
    }

    #[test]
    fn test_empty_database_lists_only_system_tables() {
        let mut db = memory_db();
        let tables = db.query_tables().unwrap();
        assert_eq!(tables.len(), 3);
        assert!(tables.iter().all(|t| t.is_system && t.schema.is_empty()));
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, SYSTEM_TABLES);
    }

    #[test]
    fn test_tables_do_not_duplicate_sqlite_sequence() {
        let mut db = memory_db();
        setup_test_schema(&db).unwrap();
        let tables = db.query_tables().unwrap();
        let user: Vec<&str> = tables
            .iter()
            .filter(|t| !t.is_system)
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(user, ["customers", "orders"]);
        assert_eq!(
            tables.iter().filter(|t| t.name == "sqlite_sequence").count(),
            1
        );
    }

    #[test]
    fn test_column_constraints() {
        let mut db = memory_db();
        setup_test_schema(&db).unwrap();

        let customers = db.query_columns("customers").unwrap();
        assert_eq!(customers.len(), 3);
        assert_eq!(customers[0].is_primary, Some(true));
        assert_eq!(customers[1].is_nullable, Some(false));
        assert_eq!(customers[2].default.as_deref(), Some("'basic'"));
        assert_eq!(customers[2].is_nullable, Some(true));

        let orders = db.query_columns("orders").unwrap();
        let customer_id = orders.iter().find(|c| c.name == "customer_id").unwrap();
        let fk = customer_id.foreign.as_ref().unwrap();
        assert_eq!(fk.to_string(), "customers(id)");
        assert_eq!(fk.on_delete.as_deref(), Some("CASCADE"));
        assert_eq!(fk.on_update.as_deref(), Some("NO ACTION"));
        assert!(orders.iter().find(|c| c.name == "total").unwrap().foreign.is_none());
    }

    #[test]
    fn test_unknown_table_has_no_columns() {
        let mut db = memory_db();
        assert!(db.query_columns("nope").unwrap().is_empty());
    }

    #[test]
    fn test_processes_are_unsupported() {
        let mut db = memory_db();
        assert!(matches!(db.query_processes(), Err(DshError::Unsupported(_))));
        assert!(matches!(db.kill_process(42, false), Err(DshError::Unsupported(_))));
    }
}
