/// Chunked Export Module
///
/// Streams a whole table, optionally filtered, into an output sink one
/// LIMIT/OFFSET chunk at a time. At most one chunk is held in memory: each
/// batch is handed to the sink and dropped before the next one is fetched.
///
/// No transaction spans the row count and the chunk reads.

use crate::core::db::Database;
use crate::core::{DshError, Result};
use crate::output::Sink;
use tracing::{debug, info};

/// Rows fetched per query
pub const CHUNK_SIZE: u64 = 1000;

/// Offsets `0, chunk, 2 * chunk, ...` strictly below `total`.
pub fn chunk_offsets(total: u64, chunk_size: u64) -> impl Iterator<Item = u64> {
    let step = chunk_size.max(1);
    std::iter::successors(Some(0u64), move |offset| offset.checked_add(step))
        .take_while(move |offset| *offset < total)
}

/// Builds the statement that fetches one chunk.
pub fn chunk_query(table: &str, filter: Option<&str>, limit: u64, offset: u64) -> String {
    let mut sql = format!("SELECT * FROM {table}");
    if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        sql.push_str(&format!(" WHERE {filter}"));
    }
    sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    sql
}

/// What an export did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Row count reported before paging
    pub total_rows: u64,
    pub rows_written: u64,
    pub chunks: u64,
    /// Only the first chunk was written because the sink is single-shot
    pub truncated: bool,
}

/// Sequential chunked exporter.
#[derive(Debug, Clone, Copy)]
pub struct Exporter {
    chunk_size: u64,
}

impl Default for Exporter {
    fn default() -> Self {
        Exporter {
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(chunk_size: u64) -> Self {
        Exporter {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Exports `table` into `sink`.
    ///
    /// A sink that cannot take more than one write receives the whole table
    /// when it fits in one chunk. Otherwise it receives only the first chunk,
    /// preceded by a truncation warning on the sink's warning channel.
    ///
    /// # Errors
    ///
    /// Returns `DshError::Config` when the table does not fit in one chunk and
    /// the sink supports neither multiple writes nor warnings. Counting,
    /// fetching and writing errors are returned as they occur; chunks
    /// already written stay written.
    pub fn export<D, S>(
        &self,
        db: &mut D,
        sink: &mut S,
        table: &str,
        filter: Option<&str>,
    ) -> Result<ExportSummary>
    where
        D: Database + ?Sized,
        S: Sink + ?Sized,
    {
        let total = db.count(table, filter)?;
        let truncated = !sink.supports_multiple_writes() && total >= self.chunk_size;

        if truncated {
            match sink.warnings() {
                Some(warnings) => warnings.write_warning(&format!(
                    "output is limited to {} rows",
                    self.chunk_size
                ))?,
                None => {
                    return Err(DshError::Config(
                        "output format does not support multiple writes".to_string(),
                    ))
                }
            }
        }

        let mut summary = ExportSummary {
            total_rows: total,
            rows_written: 0,
            chunks: 0,
            truncated,
        };
        let max_chunks = if truncated { 1 } else { usize::MAX };

        for offset in chunk_offsets(total, self.chunk_size).take(max_chunks) {
            let sql = chunk_query(table, filter, self.chunk_size, offset);
            debug!(%table, offset, "Fetching chunk");
            let batch = db.query_data(&sql)?;
            sink.write(&batch)?;
            summary.rows_written += batch.len() as u64;
            summary.chunks += 1;
        }

        info!(
            %table,
            total = summary.total_rows,
            written = summary.rows_written,
            chunks = summary.chunks,
            truncated = summary.truncated,
            "Export finished"
        );
        Ok(summary)
    }
}
