/// CSV Output
///
/// Writes the header with the first batch and plain records afterwards, so
/// any number of chunks can be appended. NULL becomes an empty field.

use crate::core::db::{RecordBatch, Value};
use crate::core::{DshError, Result};
use crate::output::Sink;
use std::io::Write;

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        CsvSink {
            writer: csv::WriterBuilder::new().flexible(true).from_writer(writer),
            header_written: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

fn field(value: &Value) -> String {
    value.to_text().unwrap_or_default()
}

impl<W: Write> Sink for CsvSink<W> {
    fn supports_multiple_writes(&self) -> bool {
        true
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        if !self.header_written {
            self.writer.write_record(batch.columns())?;
            self.header_written = true;
        }
        for row in batch.rows() {
            self.writer.write_record(row.iter().map(field))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn write_error(&mut self, err: &DshError) -> Result<()> {
        self.writer.write_record([err.to_string()])?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(ids: &[i64]) -> RecordBatch {
        RecordBatch::from_rows(
            vec!["id".into(), "note".into()],
            ids.iter()
                .map(|id| vec![Value::Int(*id), Value::Text(format!("n, {id}"))])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_header_once_across_chunks() {
        let mut sink = CsvSink::new(Vec::new());
        sink.write(&chunk(&[1])).unwrap();
        sink.write(&chunk(&[2])).unwrap();
        let out = String::from_utf8(sink.get_ref().clone()).unwrap();
        assert_eq!(out, "id,note\n1,\"n, 1\"\n2,\"n, 2\"\n");
    }

    #[test]
    fn test_null_is_empty_field() {
        let batch = RecordBatch::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Null, Value::Int(0)]],
        )
        .unwrap();
        let mut sink = CsvSink::new(Vec::new());
        sink.write(&batch).unwrap();
        let out = String::from_utf8(sink.get_ref().clone()).unwrap();
        assert_eq!(out, "a,b\n,0\n");
    }

    #[test]
    fn test_error_record() {
        let mut sink = CsvSink::new(Vec::new());
        sink.write_error(&DshError::Config("empty DSN".into())).unwrap();
        let out = String::from_utf8(sink.get_ref().clone()).unwrap();
        assert_eq!(out, "Configuration error: empty DSN\n");
    }
}
