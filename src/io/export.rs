//! CSV export for recorder tables.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Writes one table to a file: header row of column names, then one data
/// row per recorded step. Produces deterministic output for identical
/// inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn write_table(path: &Path, columns: &[String], rows: &[Vec<f64>]) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_table_to(buf, columns, rows)
}

/// Writes one table as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_table_to(writer: impl Write, columns: &[String], rows: &[Vec<f64>]) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(columns)?;
    for row in rows {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }

    wtr.flush()?;
    Ok(())
}
