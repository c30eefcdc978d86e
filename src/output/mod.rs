/// Output Module
///
/// Sinks consume record batches without the producer knowing the rendering
/// format. The chunked exporter only relies on the [`Sink`] contract: whether
/// the sink takes more than one write, the writes themselves, and an optional
/// warning channel.

pub mod csv;
pub mod json;
pub mod jsonl;
pub mod sql;
pub mod table;

pub use self::csv::CsvSink;
pub use self::json::JsonSink;
pub use self::jsonl::JsonlSink;
pub use self::sql::{SqlMode, SqlSink};
pub use self::table::TableSink;

use crate::core::db::RecordBatch;
use crate::core::{DshError, Result};
use std::io::Write;

/// A consumer of record batches.
pub trait Sink {
    /// Whether the sink can receive more than one batch. Single-shot sinks
    /// close their output after the first write.
    fn supports_multiple_writes(&self) -> bool;

    fn write(&mut self, batch: &RecordBatch) -> Result<()>;

    fn write_error(&mut self, err: &DshError) -> Result<()>;

    /// The sink's warning channel, if it has one.
    fn warnings(&mut self) -> Option<&mut dyn WarningSink> {
        None
    }
}

/// Optional capability: human-readable warnings alongside the data.
pub trait WarningSink {
    fn write_warning(&mut self, message: &str) -> Result<()>;
}

/// Output formats selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
    Jsonl,
    Sql,
}

/// Opens a sink of the given format over `writer`.
///
/// `table` names the target of generated SQL statements; other formats
/// ignore it.
pub fn open<W: Write + 'static>(format: OutputFormat, writer: W, table: Option<&str>) -> Box<dyn Sink> {
    match format {
        OutputFormat::Table => Box::new(TableSink::new(writer)),
        OutputFormat::Csv => Box::new(CsvSink::new(writer)),
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
        OutputFormat::Jsonl => Box::new(JsonlSink::new(writer)),
        OutputFormat::Sql => Box::new(SqlSink::new(writer, table.unwrap_or("data"))),
    }
}

/// Fails when a single-shot sink is written twice.
pub(crate) fn ensure_open(closed: bool, name: &str) -> Result<()> {
    if closed {
        Err(DshError::Output(format!(
            "{name} output is closed and cannot take another write"
        )))
    } else {
        Ok(())
    }
}
