/// MySQL Adapter Module
///
/// Queries run over the text protocol, where every non-NULL value arrives as
/// bytes; the column metadata decides how those bytes are decoded.

use crate::core::db::connection::{Dsn, Engine};
use crate::core::db::types::{columns_with_constraints, processes_from_batch, Column, Process, Table};
use crate::core::db::value::{quote_literal, RecordBatch, Value};
use crate::core::db::Database;
use crate::core::{DshError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use mysql::consts::{ColumnFlags, ColumnType};
use mysql::prelude::Queryable;
use mysql::{Conn, Opts};
use tracing::debug;

pub const SYSTEM_SCHEMAS: [&str; 4] = ["mysql", "information_schema", "performance_schema", "sys"];

/// `character_set` id MySQL uses for binary strings
const BINARY_CHARSET: u16 = 63;

const TABLES_SQL: &str = "SELECT table_name, table_schema FROM information_schema.tables";

const PROCESSES_SQL: &str = "SELECT id, time, user, db, info FROM information_schema.processlist";

pub struct Mysql {
    conn: Conn,
    dsn: Dsn,
}

impl Mysql {
    /// Connects to the server named by the connection string.
    pub fn open(dsn: Dsn) -> Result<Self> {
        let opts = Opts::from_url(&dsn.driver_url()).map_err(mysql::Error::from)?;
        let conn = Conn::new(opts)?;
        debug!(dsn = %dsn.redacted(), "Connected to MySQL");
        Ok(Mysql { conn, dsn })
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }
}

/// What the decoder needs to know about a result column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnKind {
    pub column_type: ColumnType,
    pub unsigned: bool,
    pub binary: bool,
}

impl From<&mysql::Column> for ColumnKind {
    fn from(column: &mysql::Column) -> Self {
        ColumnKind {
            column_type: column.column_type(),
            unsigned: column.flags().contains(ColumnFlags::UNSIGNED_FLAG),
            binary: column.character_set() == BINARY_CHARSET,
        }
    }
}

fn parse<T: std::str::FromStr>(text: &str, kind: ColumnKind) -> Result<T> {
    text.trim().parse().map_err(|_| {
        DshError::Decode(format!("cannot decode '{text}' as {:?}", kind.column_type))
    })
}

fn text_or_bytes(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::Text(text.to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

/// Decodes a text-protocol value using its column type.
pub fn decode_text(bytes: &[u8], kind: ColumnKind) -> Result<Value> {
    use ColumnType::*;

    let value = match kind.column_type {
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
        | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
            let text = String::from_utf8_lossy(bytes);
            if kind.unsigned {
                Value::UInt(parse(&text, kind)?)
            } else {
                Value::Int(parse(&text, kind)?)
            }
        }
        MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => {
            Value::Float(parse(&String::from_utf8_lossy(bytes), kind)?)
        }
        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => {
            let text = String::from_utf8_lossy(bytes);
            // Zero dates ("0000-00-00") have no calendar value; keep the text.
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map(Value::Date)
                .unwrap_or_else(|_| Value::Text(text.into_owned()))
        }
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 | MYSQL_TYPE_TIMESTAMP
        | MYSQL_TYPE_TIMESTAMP2 => {
            let text = String::from_utf8_lossy(bytes);
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                .map(Value::Timestamp)
                .unwrap_or_else(|_| Value::Text(text.into_owned()))
        }
        MYSQL_TYPE_BIT | MYSQL_TYPE_GEOMETRY => Value::Bytes(bytes.to_vec()),
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB
        | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING | MYSQL_TYPE_VARCHAR
            if kind.binary =>
        {
            Value::Bytes(bytes.to_vec())
        }
        // DECIMAL, TIME, JSON, ENUM, SET and strings keep their text form.
        _ => text_or_bytes(bytes),
    };
    Ok(value)
}

fn unquoted_sql(value: &mysql::Value) -> Value {
    Value::Text(value.as_sql(true).trim_matches('\'').to_string())
}

/// Decodes one value of a row, whichever protocol produced it.
pub fn decode_value(value: &mysql::Value, kind: ColumnKind) -> Result<Value> {
    let decoded = match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Int(v) => Value::Int(*v),
        mysql::Value::UInt(v) => Value::UInt(*v),
        mysql::Value::Float(v) => Value::Float((*v).into()),
        mysql::Value::Double(v) => Value::Float(*v),
        mysql::Value::Bytes(bytes) => return decode_text(bytes, kind),
        mysql::Value::Date(y, m, d, h, i, s, us) => {
            let date = NaiveDate::from_ymd_opt((*y).into(), (*m).into(), (*d).into());
            match date {
                Some(date) if matches!(kind.column_type, ColumnType::MYSQL_TYPE_DATE) => Value::Date(date),
                Some(date) => date
                    .and_hms_micro_opt((*h).into(), (*i).into(), (*s).into(), *us)
                    .map(Value::Timestamp)
                    .unwrap_or_else(|| unquoted_sql(value)),
                None => unquoted_sql(value),
            }
        }
        mysql::Value::Time(..) => unquoted_sql(value),
    };
    Ok(decoded)
}

/// Statement used to stop a session: `KILL QUERY` cancels the running
/// statement, plain `KILL` drops the connection.
pub fn kill_statement(pid: i64, force: bool) -> String {
    if force {
        format!("KILL {pid}")
    } else {
        format!("KILL QUERY {pid}")
    }
}

fn columns_sql(table: &str) -> String {
    format!(
        "SELECT
            column_name,
            column_type,
            (CASE WHEN is_nullable = 'YES' THEN true ELSE false END) AS is_nullable,
            column_default
        FROM information_schema.columns
        WHERE table_name = {} AND table_schema = DATABASE()
        ORDER BY ordinal_position",
        quote_literal(table)
    )
}

fn constraints_sql(table: &str) -> String {
    format!(
        "SELECT DISTINCT
            tc.CONSTRAINT_TYPE,
            kcu.TABLE_NAME AS referencing_table,
            kcu.COLUMN_NAME AS referencing_column,
            kcu.REFERENCED_TABLE_NAME AS referenced_table,
            kcu.REFERENCED_COLUMN_NAME AS referenced_column,
            rc.UPDATE_RULE AS foreign_on_update,
            rc.DELETE_RULE AS foreign_on_delete
        FROM information_schema.TABLE_CONSTRAINTS AS tc
            JOIN information_schema.KEY_COLUMN_USAGE AS kcu
              ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
              AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
              AND tc.TABLE_NAME = kcu.TABLE_NAME
            LEFT JOIN information_schema.REFERENTIAL_CONSTRAINTS AS rc
              ON rc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
              AND rc.CONSTRAINT_SCHEMA = tc.TABLE_SCHEMA
        WHERE tc.TABLE_NAME = {} AND tc.TABLE_SCHEMA = DATABASE()",
        quote_literal(table)
    )
}

impl Database for Mysql {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    fn query_data(&mut self, sql: &str) -> Result<RecordBatch> {
        let result = self.conn.query_iter(sql)?;
        let columns: Vec<mysql::Column> = result.columns().as_ref().to_vec();
        let kinds: Vec<ColumnKind> = columns.iter().map(ColumnKind::from).collect();
        let mut batch = RecordBatch::new(columns.iter().map(|c| c.name_str().into_owned()).collect());
        for row in result {
            let row = row?;
            let mut values = Vec::with_capacity(kinds.len());
            for (idx, kind) in kinds.iter().enumerate() {
                let value = row
                    .as_ref(idx)
                    .ok_or_else(|| DshError::Decode(format!("missing value for column {idx}")))?;
                values.push(decode_value(value, *kind)?);
            }
            batch.push_row(values)?;
        }
        Ok(batch)
    }

    fn query_tables(&mut self) -> Result<Vec<Table>> {
        let data = self.query_data(TABLES_SQL)?;
        let tables = data
            .rows()
            .iter()
            .map(|row| {
                let name = row[0].to_text().unwrap_or_default();
                let schema = row[1].to_text().unwrap_or_default();
                if SYSTEM_SCHEMAS.contains(&schema.as_str()) {
                    Table::system(schema, name)
                } else {
                    Table::new(schema, name)
                }
            })
            .collect();
        Ok(tables)
    }

    fn query_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let columns = self.query_data(&columns_sql(table))?;
        let constraints = self.query_data(&constraints_sql(table))?;
        Ok(columns_with_constraints(table, &columns, Some(&constraints)))
    }

    fn query_processes(&mut self) -> Result<Vec<Process>> {
        let data = self.query_data(PROCESSES_SQL)?;
        Ok(processes_from_batch(&data))
    }

    fn kill_process(&mut self, pid: i64, force: bool) -> Result<()> {
        debug!(pid, force, "Killing MySQL session");
        // Unknown thread ids come back as server error 1094.
        self.conn.query_drop(kill_statement(pid, force))?;
        Ok(())
    }
}
