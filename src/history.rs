//! Append-only log of captured colors
//!
//! Records are numbered from 1 in insertion order and never modified. Clearing
//! empties the log but does not reuse sequence numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::color::Rgb;
use crate::notation::MunsellNotation;

/// Where a color was sampled, in source image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HistoryRecord {
    pub sequence: u64,
    pub pixel: Rgb,
    pub notation: MunsellNotation,
    pub position: Option<Position>,
    pub note: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Everything a record carries except what the store assigns
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub pixel: Rgb,
    pub notation: MunsellNotation,
    pub position: Option<Position>,
    pub note: Option<String>,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    records: Vec<HistoryRecord>,
    last_sequence: u64,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a capture stamped with the current time
    pub fn append(&mut self, capture: Capture) -> &HistoryRecord {
        self.append_at(capture, Utc::now())
    }

    pub fn append_at(&mut self, capture: Capture, captured_at: DateTime<Utc>) -> &HistoryRecord {
        self.last_sequence += 1;
        let note = capture.note.filter(|n| !n.trim().is_empty());
        self.records.push(HistoryRecord {
            sequence: self.last_sequence,
            pixel: capture.pixel,
            notation: capture.notation,
            position: capture.position,
            note,
            captured_at,
        });

        let record = &self.records[self.records.len() - 1];
        tracing::debug!("History #{}: {}", record.sequence, record.notation);
        record
    }

    /// Records in insertion order
    pub fn all(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        tracing::info!("Clearing {} history records", self.records.len());
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
