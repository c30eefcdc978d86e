/// Postgres Adapter Module
///
/// Introspection through `information_schema`, sessions through
/// `pg_stat_activity`, and cancel/terminate through the backend signalling
/// functions.

use crate::core::db::connection::{Dsn, Engine};
use crate::core::db::types::{columns_with_constraints, processes_from_batch, Column, Process, Table};
use crate::core::db::value::{quote_literal, RecordBatch, Value};
use crate::core::db::Database;
use crate::core::{DshError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{FromSql, Kind, Type};
use postgres::{Client, NoTls, Row, SimpleQueryMessage};
use std::error::Error as StdError;
use std::fmt::Write as _;
use tracing::{debug, warn};

pub const SYSTEM_SCHEMAS: [&str; 2] = ["pg_catalog", "information_schema"];

const TABLES_SQL: &str = "SELECT table_name::text, table_schema::text FROM information_schema.tables";

const PROCESSES_SQL: &str = "
    SELECT
        pid,
        EXTRACT(EPOCH FROM now() - query_start)::float8 AS duration,
        usename::text,
        datname::text,
        query
    FROM pg_stat_activity";

pub struct Postgres {
    client: Client,
    dsn: Dsn,
}

impl Postgres {
    /// Connects to the server named by the connection string.
    pub fn open(dsn: Dsn) -> Result<Self> {
        let client = Client::connect(&dsn.driver_url(), NoTls)?;
        debug!(dsn = %dsn.redacted(), "Connected to Postgres");
        Ok(Postgres { client, dsn })
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }
}

/// Enum labels, which travel as plain UTF-8 text.
struct EnumLabel(String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(EnumLabel(String::from_utf8_lossy(raw).into_owned()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

/// INTERVAL rendered the way the server prints it.
struct Interval(String);

impl<'a> FromSql<'a> for Interval {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(Interval(decode_interval(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

/// Decodes the binary INTERVAL format: microseconds, days and months, each
/// big-endian.
pub fn decode_interval(raw: &[u8]) -> std::result::Result<String, Box<dyn StdError + Sync + Send>> {
    if raw.len() != 16 {
        return Err(format!("invalid INTERVAL length {}", raw.len()).into());
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into()?);
    let days = i32::from_be_bytes(raw[8..12].try_into()?);
    let months = i32::from_be_bytes(raw[12..16].try_into()?);
    Ok(format_interval(months, days, micros))
}

/// Formats an interval in the default `postgres` interval style, e.g.
/// `1 year 2 mons 3 days 04:05:06.5`.
pub fn format_interval(months: i32, days: i32, micros: i64) -> String {
    let mut out = String::new();
    // Once a field is negative, later positive fields carry an explicit `+`.
    let mut negative_before = false;
    let mut unit = |out: &mut String, n: i64, name: &str| {
        if n == 0 {
            return;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        let plus = if negative_before && n > 0 { "+" } else { "" };
        let plural = if n == 1 { "" } else { "s" };
        let _ = write!(out, "{plus}{n} {name}{plural}");
        negative_before = n < 0;
    };
    unit(&mut out, i64::from(months / 12), "year");
    unit(&mut out, i64::from(months % 12), "mon");
    unit(&mut out, i64::from(days), "day");

    if micros != 0 || out.is_empty() {
        let sign = if micros < 0 {
            "-"
        } else if negative_before {
            "+"
        } else {
            ""
        };
        if !out.is_empty() {
            out.push(' ');
        }
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let _ = write!(out, "{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        let frac = total % 1_000_000;
        if frac != 0 {
            let digits = format!("{frac:06}");
            out.push('.');
            out.push_str(digits.trim_end_matches('0'));
        }
    }
    out
}

/// NUMERIC rendered as exact decimal text.
struct Numeric(String);

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(Numeric(decode_numeric(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Decodes the binary NUMERIC format: a header of digit count, weight,
/// sign and display scale, followed by base-10000 digits.
pub fn decode_numeric(raw: &[u8]) -> std::result::Result<String, Box<dyn StdError + Sync + Send>> {
    let word = |i: usize| -> std::result::Result<u16, Box<dyn StdError + Sync + Send>> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };
    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as usize;
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match sign {
        0x0000 | 0x4000 => {}
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        other => return Err(format!("invalid NUMERIC sign {other:#x}").into()),
    }

    let digit = |group: i32| -> u16 {
        usize::try_from(group)
            .ok()
            .and_then(|g| digits.get(g).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for group in 0..=weight {
            if group == 0 {
                write!(out, "{}", digit(group))?;
            } else {
                write!(out, "{:04}", digit(group))?;
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut group = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit(group))?;
            group += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    Ok(row.try_get::<_, Option<T>>(idx)?)
}

/// Decodes one column of a row according to its declared wire type.
pub fn decode_column(row: &Row, idx: usize, ty: &Type) -> Result<Value> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::CHAR => get::<i8>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT2 => get::<i16>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::Float),
        Type::NUMERIC => get::<Numeric>(row, idx)?.map(|n| Value::Text(n.0)),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(Value::Date),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(Value::Time),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(Value::TimestampTz),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|v| Value::Text(v.to_string())),
        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx)?.map(|v| Value::Text(v.to_string()))
        }
        Type::INTERVAL => get::<Interval>(row, idx)?.map(|v| Value::Text(v.0)),
        _ if <String as FromSql>::accepts(ty) => get::<String>(row, idx)?.map(Value::Text),
        _ if EnumLabel::accepts(ty) => get::<EnumLabel>(row, idx)?.map(|v| Value::Text(v.0)),
        _ => {
            return Err(DshError::Query(format!(
                "no binary decoder for column type {ty}"
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Whether `decode_column` can read values of `ty` from the binary protocol.
pub fn decodes_binary(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::CHAR
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::BYTEA
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::UUID
            | Type::JSON
            | Type::JSONB
            | Type::INTERVAL
    ) || <String as FromSql>::accepts(ty)
        || EnumLabel::accepts(ty)
}

/// Decodes a value the server sent in its text form.
///
/// Used for result sets with types that have no binary decoder (MONEY, INET,
/// TIMETZ, arrays, ranges, ...). Scalars the binary path types are parsed
/// back into the same kinds; anything that does not parse stays text.
pub fn decode_text(ty: &Type, text: Option<&str>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };
    let parsed = match *ty {
        Type::BOOL => match text {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => text.parse().ok().map(Value::Int),
        Type::FLOAT4 | Type::FLOAT8 => text.parse().ok().map(Value::Float),
        Type::BYTEA => text.strip_prefix("\\x").and_then(decode_hex).map(Value::Bytes),
        Type::DATE => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Value::Date),
        Type::TIME => NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok().map(Value::Time),
        Type::TIMESTAMP => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(|v| Value::TimestampTz(v.with_timezone(&Utc))),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.to_string()))
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

/// Statement used to stop a backend: cancel the running query, or
/// terminate the whole session when forced.
pub fn kill_statement(pid: i64, force: bool) -> String {
    if force {
        format!("SELECT pg_terminate_backend({pid})")
    } else {
        format!("SELECT pg_cancel_backend({pid})")
    }
}

/// The signalling functions answer `false` (with a server warning) when the
/// pid is not a backend; that is reported as an error, not as success.
pub fn check_kill_result(pid: i64, result: &RecordBatch) -> Result<()> {
    match result.scalar() {
        Some(Value::Bool(true)) => Ok(()),
        Some(Value::Bool(false)) => Err(DshError::ProcessNotFound(pid)),
        other => Err(DshError::Query(format!(
            "unexpected answer from backend signal for pid {pid}: {}",
            other.map(ToString::to_string).unwrap_or_else(|| "no rows".to_string())
        ))),
    }
}

/// Splits an optional `schema.` prefix off a table name. Unqualified names
/// are looked up in the schemas on the search path.
fn table_scope(table: &str) -> (String, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (format!("= {}", quote_literal(schema)), name),
        None => ("= ANY(current_schemas(false))".to_string(), table),
    }
}

fn columns_sql(table: &str) -> String {
    let (schema, table) = table_scope(table);
    format!(
        "SELECT
            column_name::text,
            data_type::text,
            is_nullable = 'YES' AS is_nullable,
            column_default::text
        FROM information_schema.columns
        WHERE table_schema::name {schema}
          AND table_name = {}
        ORDER BY ordinal_position",
        quote_literal(table)
    )
}

fn constraints_sql(table: &str) -> String {
    let (schema, table) = table_scope(table);
    format!(
        "SELECT DISTINCT
            tc.constraint_type::text,
            kcu.table_name::text AS referencing_table,
            kcu.column_name::text AS referencing_column,
            ccu.table_name::text AS referenced_table,
            ccu.column_name::text AS referenced_column,
            rc.update_rule::text AS foreign_on_update,
            rc.delete_rule::text AS foreign_on_delete
        FROM information_schema.table_constraints AS tc
            JOIN information_schema.key_column_usage AS kcu
              ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
            LEFT JOIN information_schema.referential_constraints AS rc
              ON rc.constraint_name = tc.constraint_name
              AND rc.constraint_schema = tc.table_schema
            LEFT JOIN information_schema.constraint_column_usage AS ccu
              ON tc.constraint_type = 'FOREIGN KEY'
              AND ccu.constraint_name = tc.constraint_name
              AND ccu.constraint_schema = tc.table_schema
        WHERE tc.table_schema::name {schema}
          AND tc.table_name = {}
          AND tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY')",
        quote_literal(table)
    )
}

impl Database for Postgres {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn query_data(&mut self, sql: &str) -> Result<RecordBatch> {
        let stmt = self.client.prepare(sql)?;
        let columns = stmt.columns();
        let mut batch = RecordBatch::new(columns.iter().map(|c| c.name().to_string()).collect());

        if !columns.iter().all(|c| decodes_binary(c.type_())) {
            debug!("Result has types without a binary decoder, reading text form");
            let types: Vec<Type> = columns.iter().map(|c| c.type_().clone()).collect();
            for message in self.client.simple_query(sql)? {
                if let SimpleQueryMessage::Row(row) = message {
                    let values = types
                        .iter()
                        .enumerate()
                        .map(|(idx, ty)| Ok(decode_text(ty, row.try_get(idx)?)))
                        .collect::<Result<Vec<_>>>()?;
                    batch.push_row(values)?;
                }
            }
            return Ok(batch);
        }

        for row in self.client.query(&stmt, &[])? {
            let values = columns
                .iter()
                .enumerate()
                .map(|(idx, column)| decode_column(&row, idx, column.type_()))
                .collect::<Result<Vec<_>>>()?;
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
        // Constraint views can be hidden from unprivileged roles; fall back
        // to name/type/nullability only.
        let constraints = match self.query_data(&constraints_sql(table)) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(%table, error = %err, "Constraint metadata unavailable");
                None
            }
        };
        let (_, name) = table_scope(table);
        Ok(columns_with_constraints(name, &columns, constraints.as_ref()))
    }

    fn query_processes(&mut self) -> Result<Vec<Process>> {
        let data = self.query_data(PROCESSES_SQL)?;
        Ok(processes_from_batch(&data))
    }

    fn kill_process(&mut self, pid: i64, force: bool) -> Result<()> {
        debug!(pid, force, "Signalling Postgres backend");
        let result = self.query_data(&kill_statement(pid, force))?;
        check_kill_result(pid, &result)
    }
}
