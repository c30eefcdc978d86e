/// JSON Lines Output
///
/// One object per row, keys in projection order. Lines are independent, so
/// chunks append freely.

use crate::core::db::value::RowObject;
use crate::core::db::RecordBatch;
use crate::core::{DshError, Result};
use crate::output::Sink;
use std::io::Write;

pub struct JsonlSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        JsonlSink { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write> Sink for JsonlSink<W> {
    fn supports_multiple_writes(&self) -> bool {
        true
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        for row in batch.rows() {
            let object = RowObject {
                columns: batch.columns(),
                row,
            };
            serde_json::to_writer(&mut self.writer, &object)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn write_error(&mut self, err: &DshError) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &serde_json::json!({ "error": err.to_string() }))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::Value;

    #[test]
    fn test_lines_keep_column_order() {
        let batch = RecordBatch::from_rows(
            vec!["zeta".into(), "alpha".into()],
            vec![
                vec![Value::Int(1), Value::Bool(true)],
                vec![Value::Int(2), Value::Null],
            ],
        )
        .unwrap();
        let mut sink = JsonlSink::new(Vec::new());
        sink.write(&batch).unwrap();
        sink.write(&batch).unwrap();

        let out = String::from_utf8(sink.get_ref().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"zeta":1,"alpha":true}"#);
        assert_eq!(lines[1], r#"{"zeta":2,"alpha":null}"#);
    }

    #[test]
    fn test_error_line() {
        let mut sink = JsonlSink::new(Vec::new());
        sink.write_error(&DshError::Query("bad".into())).unwrap();
        let out = String::from_utf8(sink.get_ref().clone()).unwrap();
        assert_eq!(out, "{\"error\":\"Query error: bad\"}\n");
    }
}
