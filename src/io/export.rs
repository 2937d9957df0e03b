//! CSV export of monitored attribute values.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::clock::SimClock;

/// Name of the first column of every results file.
pub const TIME_COLUMN: &str = "date";

/// Observed values keyed by step and column (`<model>.<attr>`).
#[derive(Debug, Clone)]
pub struct ResultsTable {
    clock: SimClock,
    columns: BTreeSet<String>,
    rows: BTreeMap<u64, BTreeMap<String, f64>>,
}

impl ResultsTable {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            columns: BTreeSet::new(),
            rows: BTreeMap::new(),
        }
    }

    /// Stores `value` for `column` at `step`, replacing an earlier value.
    pub fn record(&mut self, step: u64, column: &str, value: f64) {
        if !self.columns.contains(column) {
            self.columns.insert(column.to_string());
        }
        self.rows
            .entry(step)
            .or_default()
            .insert(column.to_string(), value);
    }

    /// Column names in output order, excluding the time column.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Number of steps with at least one value.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value recorded for `column` at `step`, if any.
    pub fn get(&self, step: u64, column: &str) -> Option<f64> {
        self.rows.get(&step)?.get(column).copied()
    }
}

/// Exports a results table to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(table: &ResultsTable, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(table, buf)
}

/// Writes a results table as CSV to any writer.
///
/// One row per recorded step, in step order. Cells with no value for that
/// step are left empty.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(table: &ResultsTable, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let header = std::iter::once(TIME_COLUMN).chain(table.columns());
    wtr.write_record(header)?;

    for (step, values) in &table.rows {
        let mut record = Vec::with_capacity(table.columns.len() + 1);
        record.push(table.clock.label(*step));
        for col in &table.columns {
            record.push(values.get(col).map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
