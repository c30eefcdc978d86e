/// Table Output
///
/// Renders a batch as an aligned text grid for terminals. A grid is complete
/// once drawn, so the sink is single-shot; warnings and errors are plain
/// prefixed lines and may be written around it.

use crate::core::db::{RecordBatch, Value};
use crate::core::{DshError, Result};
use crate::output::{ensure_open, Sink, WarningSink};
use std::io::Write;

/// Longest cell content shown before truncation
const MAX_CELL_WIDTH: usize = 80;

pub struct TableSink<W: Write> {
    writer: W,
    closed: bool,
}

impl<W: Write> TableSink<W> {
    pub fn new(writer: W) -> Self {
        TableSink {
            writer,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

fn cell(value: &Value) -> String {
    let text: String = value
        .to_string()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if text.chars().count() > MAX_CELL_WIDTH {
        let mut cut: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
        cut.push('…');
        cut
    } else {
        text
    }
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

fn line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells.iter().zip(widths).map(|(c, w)| pad(c, *w)).collect();
    format!("{}\n", padded.join(" | ").trim_end())
}

/// Renders the grid with headers, a separator line, and one line per row.
pub fn render(batch: &RecordBatch) -> String {
    let rows: Vec<Vec<String>> = batch
        .rows()
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();
    let widths: Vec<usize> = batch
        .columns()
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut output = String::new();
    output.push_str(&line(batch.columns(), &widths));
    let underline: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&underline.join("-|-"));
    output.push('\n');
    for row in &rows {
        output.push_str(&line(row, &widths));
    }
    output
}

impl<W: Write> Sink for TableSink<W> {
    fn supports_multiple_writes(&self) -> bool {
        false
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        ensure_open(self.closed, "table")?;
        self.writer.write_all(render(batch).as_bytes())?;
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }

    fn write_error(&mut self, err: &DshError) -> Result<()> {
        writeln!(self.writer, "error occurred: {err}")?;
        Ok(())
    }

    fn warnings(&mut self) -> Option<&mut dyn WarningSink> {
        Some(self)
    }
}

impl<W: Write> WarningSink for TableSink<W> {
    fn write_warning(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "warning: {message}")?;
        Ok(())
    }
}
