//! Output writers

use claimscan_core::{Error, Result, Value, ViolationTable};
use claimscan_report::ViolationReport;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::ingest::Format;

/// Write the violation table as CSV or JSON, by extension
pub fn write_violations(path: &Path, violations: &ViolationTable) -> Result<()> {
    match output_format(path)? {
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(path)?));
            writer.write_record(violations.columns())?;
            for record in violations.records() {
                writer.write_record(record.iter().map(cell))?;
            }
            writer.flush()?;
        }
        _ => write_json(path, violations)?,
    }

    info!(path = %path.display(), rows = %violations.len(), "Wrote violations");
    Ok(())
}

/// Write the report as CSV rows, or as JSON sections per rule
pub fn write_report(path: &Path, report: &ViolationReport) -> Result<()> {
    match output_format(path)? {
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(path)?));
            writer.write_record(report.columns())?;
            for row in report.rows() {
                writer.write_record(row.cells().iter().map(cell))?;
            }
            writer.flush()?;
        }
        _ => write_json(path, &report.by_rule())?,
    }

    info!(path = %path.display(), rows = %report.len(), "Wrote report");
    Ok(())
}

/// Write any serializable value as pretty JSON
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write plain text, such as a Prometheus exposition
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text)?;
    Ok(())
}

fn output_format(path: &Path) -> Result<Format> {
    match Format::from_path(path)? {
        Format::Yaml => Err(Error::report(format!(
            "output must be csv or json: {}",
            path.display()
        ))),
        format => Ok(format),
    }
}

fn cell(value: &Value) -> String {
    value.to_string()
}
