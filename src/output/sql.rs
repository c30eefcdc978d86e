/// SQL Output
///
/// Renders batches as SQL statements: `INSERT` statements for data, or a
/// `CREATE TABLE` statement when the batch is a column listing (name in the
/// first column, type in the second). Each batch becomes a standalone
/// statement, so the sink takes any number of writes.

use crate::core::db::RecordBatch;
use crate::core::{DshError, Result};
use crate::output::Sink;
use std::io::Write;

/// What the rows of a batch describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlMode {
    #[default]
    Data,
    Schema,
}

pub struct SqlSink<W: Write> {
    writer: W,
    table: String,
    mode: SqlMode,
}

impl<W: Write> SqlSink<W> {
    pub fn new(writer: W, table: impl Into<String>) -> Self {
        SqlSink {
            writer,
            table: table.into(),
            mode: SqlMode::Data,
        }
    }

    pub fn with_mode(mut self, mode: SqlMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn create_table(&self, batch: &RecordBatch) -> String {
        let definitions: Vec<String> = batch
            .rows()
            .iter()
            .map(|row| {
                let name = row.first().and_then(|v| v.to_text()).unwrap_or_default();
                let type_name = row.get(1).and_then(|v| v.to_text()).unwrap_or_default();
                format!("{name} {type_name}").trim_end().to_string()
            })
            .collect();
        format!("CREATE TABLE {} (\n{});\n\n", self.table, definitions.join(",\n"))
    }

    fn insert(&self, batch: &RecordBatch) -> String {
        let values: Vec<String> = batch
            .rows()
            .iter()
            .map(|row| {
                let literals: Vec<String> = row.iter().map(|v| v.to_sql_literal()).collect();
                format!("({})", literals.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES\n{};\n\n",
            self.table,
            batch.columns().join(", "),
            values.join(",\n")
        )
    }
}

impl<W: Write> Sink for SqlSink<W> {
    fn supports_multiple_writes(&self) -> bool {
        true
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        let statement = match self.mode {
            SqlMode::Schema => self.create_table(batch),
            // An INSERT without rows is not valid SQL
            SqlMode::Data if batch.is_empty() => return Ok(()),
            SqlMode::Data => self.insert(batch),
        };
        self.writer.write_all(statement.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Errors have no SQL rendering; they are handed back to the caller.
    fn write_error(&mut self, err: &DshError) -> Result<()> {
        Err(DshError::Output(format!("error while writing sql: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::Value;

    fn output(sink: &SqlSink<Vec<u8>>) -> String {
        String::from_utf8(sink.get_ref().clone()).unwrap()
    }

    #[test]
    fn test_insert_statement() {
        let batch = RecordBatch::from_rows(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Int(1), Value::Text("O'Brien".into())],
                vec![Value::Int(2), Value::Null],
            ],
        )
        .unwrap();
        let mut sink = SqlSink::new(Vec::new(), "users");
        sink.write(&batch).unwrap();
        assert_eq!(
            output(&sink),
            "INSERT INTO users (id, name) VALUES\n(1, 'O''Brien'),\n(2, NULL);\n\n"
        );
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let mut sink = SqlSink::new(Vec::new(), "users");
        sink.write(&RecordBatch::new(vec!["id".into()])).unwrap();
        assert!(output(&sink).is_empty());
    }

    #[test]
    fn test_schema_mode() {
        let batch = RecordBatch::from_rows(
            vec!["COLUMN_NAME".into(), "COLUMN_TYPE".into(), "NULLABLE".into()],
            vec![
                vec!["id".into(), "INTEGER".into(), "NO".into()],
                vec!["email".into(), "TEXT".into(), "YES".into()],
            ],
        )
        .unwrap();
        let mut sink = SqlSink::new(Vec::new(), "users").with_mode(SqlMode::Schema);
        sink.write(&batch).unwrap();
        assert_eq!(
            output(&sink),
            "CREATE TABLE users (\nid INTEGER,\nemail TEXT);\n\n"
        );
    }

    #[test]
    fn test_errors_are_returned() {
        let mut sink = SqlSink::new(Vec::new(), "t");
        let err = sink.write_error(&DshError::Query("x".into())).unwrap_err();
        assert!(matches!(err, DshError::Output(_)));
        assert!(output(&sink).is_empty());
    }
}
