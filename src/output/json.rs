/// JSON Output
///
/// A whole result as one document, `{"cols": [...], "rows": [[...], ...]}`.
/// The document cannot be extended after it is written, so the sink is
/// single-shot.

use crate::core::db::{RecordBatch, Value};
use crate::core::{DshError, Result};
use crate::output::{ensure_open, Sink};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct Document<'a> {
    cols: &'a [String],
    rows: &'a [Vec<Value>],
}

#[derive(Serialize)]
struct ErrorDocument {
    error: String,
}

pub struct JsonSink<W: Write> {
    writer: W,
    closed: bool,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        JsonSink {
            writer,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write> Sink for JsonSink<W> {
    fn supports_multiple_writes(&self) -> bool {
        false
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        ensure_open(self.closed, "json")?;
        let document = Document {
            cols: batch.columns(),
            rows: batch.rows(),
        };
        serde_json::to_writer(&mut self.writer, &document)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }

    fn write_error(&mut self, err: &DshError) -> Result<()> {
        let document = ErrorDocument {
            error: err.to_string(),
        };
        serde_json::to_writer(&mut self.writer, &document)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}
