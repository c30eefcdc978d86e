/// Command-Line Support
///
/// Flags, logging and error reporting shared by the `dcat`, `dsql`, `dls`,
/// `dps` and `dkill` binaries. Only the binaries end the process; everything
/// here returns typed errors.

use crate::config;
use crate::core::db::{self, Column, Dialect, RecordBatch, Table, Value};
use crate::core::{DshError, Result};
use crate::output::{OutputFormat, Sink};
use clap::Args;
use std::io::Read;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Variable holding the log filter, e.g. `DSH_LOG=debug`.
pub const LOG_ENV_VAR: &str = "DSH_LOG";

#[derive(Args, Debug, Clone, Default)]
pub struct ConnArgs {
    #[arg(
        long,
        help = "Database connection or configured connection name (can be set via DSN/DATABASE/DATABASE_URL env)"
    )]
    pub dsn: Option<String>,
}

impl ConnArgs {
    /// Resolves the connection string and opens the database.
    pub fn open(&self) -> Result<Dialect> {
        open_database(self.dsn.as_deref())
    }
}

#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct OutputArgs {
    #[arg(long, help = "Output in CSV format")]
    pub csv: bool,
    #[arg(long, help = "Output in JSON format")]
    pub json: bool,
    #[arg(long, help = "Output in JSON lines format")]
    pub jsonl: bool,
    #[arg(long, help = "Output as SQL statements")]
    pub sql: bool,
}

impl OutputArgs {
    pub fn format(&self) -> OutputFormat {
        if self.sql {
            OutputFormat::Sql
        } else if self.csv {
            OutputFormat::Csv
        } else if self.json {
            OutputFormat::Json
        } else if self.jsonl {
            OutputFormat::Jsonl
        } else {
            OutputFormat::Table
        }
    }
}

/// Installs the stderr log subscriber, filtered by `DSH_LOG` (default `warn`).
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Loads the default configuration, resolves `dsn` against it and the
/// environment, and opens the database.
pub fn open_database(dsn: Option<&str>) -> Result<Dialect> {
    let config = config::load_default()?;
    let resolved = config::resolve_dsn(dsn, |name| std::env::var(name).ok(), config.as_ref())?;
    debug!(dsn = %db::connection::redact(&resolved), "Resolved connection string");
    db::open(&resolved)
}

/// Joins positional arguments into one statement, or reads it from `input`
/// when there are none.
pub fn statement_from<R: Read>(args: &[String], mut input: R) -> Result<String> {
    let joined = args.join(" ");
    let statement = if joined.trim().is_empty() {
        let mut buf = String::new();
        input.read_to_string(&mut buf)?;
        buf
    } else {
        joined
    };
    if statement.trim().is_empty() {
        return Err(DshError::Usage("missing SQL statement".to_string()));
    }
    Ok(statement)
}

/// Table listing as `TABLE_SCHEMA, TABLE_NAME, SYSTEM`.
pub fn tables_batch(tables: &[Table], include_system: bool) -> Result<RecordBatch> {
    let rows = tables
        .iter()
        .filter(|t| include_system || !t.is_system)
        .map(|t| {
            vec![
                Value::Text(t.schema.clone()),
                Value::Text(t.name.clone()),
                Value::Bool(t.is_system),
            ]
        })
        .collect();
    RecordBatch::from_rows(
        vec!["TABLE_SCHEMA".into(), "TABLE_NAME".into(), "SYSTEM".into()],
        rows,
    )
}

/// Column listing. Unknown constraint flags stay NULL.
pub fn columns_batch(columns: &[Column]) -> Result<RecordBatch> {
    let rows = columns
        .iter()
        .map(|c| {
            let foreign = c.foreign.as_ref();
            vec![
                Value::Text(c.name.clone()),
                Value::Text(c.type_name.clone()),
                c.is_nullable.into(),
                c.default.clone().into(),
                c.is_primary.into(),
                foreign.map(|f| f.to_string()).into(),
                foreign.and_then(|f| f.on_update.clone()).into(),
                foreign.and_then(|f| f.on_delete.clone()).into(),
            ]
        })
        .collect();
    RecordBatch::from_rows(
        [
            "COLUMN_NAME",
            "COLUMN_TYPE",
            "NULLABLE",
            "DEFAULT",
            "PRIMARY",
            "FOREIGN_REF",
            "ON_UPDATE",
            "ON_DELETE",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
        rows,
    )
}

/// Exit code for an error, by category.
pub fn exit_code(err: &DshError) -> ExitCode {
    ExitCode::from(u8::try_from(err.category().exit_code()).unwrap_or(1))
}

/// Writes `err` to the error sink and returns the exit code to end with.
/// Formats that cannot render errors fall back to a plain stderr line.
pub fn report(err: &DshError, sink: &mut dyn Sink) -> ExitCode {
    debug!(error = %err, category = ?err.category(), "Command failed");
    if sink.write_error(err).is_err() {
        eprintln!("error occurred: {err}");
    }
    exit_code(err)
}
