//! CSV export of the capture history
//!
//! One header row, then one row per record in insertion order. Quoting
//! follows RFC 4180 as implemented by the `csv` crate.

use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;

use crate::error::AppError;
use crate::history::HistoryRecord;

pub const HEADER: [&str; 9] = [
    "sequence",
    "timestamp",
    "red",
    "green",
    "blue",
    "munsell_hue",
    "munsell_value",
    "munsell_chroma",
    "note",
];

/// Write records as CSV to any writer
pub fn write_csv<W: Write>(records: &[HistoryRecord], writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(HEADER)?;

    for record in records {
        out.write_record([
            record.sequence.to_string(),
            record.captured_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            record.pixel.r.to_string(),
            record.pixel.g.to_string(),
            record.pixel.b.to_string(),
            record.notation.hue_label(),
            record.notation.value.to_string(),
            record.notation.chroma.to_string(),
            record.note.clone().unwrap_or_default(),
        ])?;
    }

    out.flush()?;
    Ok(())
}

pub fn to_csv(records: &[HistoryRecord]) -> Result<String, AppError> {
    let mut buf = Vec::new();
    write_csv(records, &mut buf).map_err(|e| AppError::Export(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| AppError::Export(e.to_string()))
}

/// Suggested download name, e.g. `munsell_history_20240131_154500.csv`
pub fn default_file_name(now: DateTime<Utc>) -> String {
    format!("munsell_history_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
