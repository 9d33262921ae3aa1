//! Munsell reference table
//!
//! Two text layouts are understood:
//!
//! - renotation rows `h V C x y Y` (whitespace separated, xyY under
//!   Illuminant C, Y in percent), the layout of the published renotation data
//! - `notation,R,G,B` rows of display sRGB values, the layout the desktop
//!   picker shipped with
//!
//! The table is immutable once loaded and owns a spatial index over its
//! coordinates.

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::color::{Converter, Lab, Rgb, Xyz, REFERENCE_WHITE};
use crate::error::TableError;
use crate::index::{GridIndex, DEFAULT_CELL_SIZE};
use crate::notation::{Hue, MunsellNotation};

/// One published notation and its coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ReferenceEntry {
    pub notation: MunsellNotation,
    pub coordinate: Lab,
}

/// Table summary for diagnostics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableInfo {
    pub source: String,
    pub entries: usize,
    pub hue_pages: usize,
    pub neutral_entries: usize,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub max_chroma: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ReferenceTable {
    source: String,
    entries: Vec<ReferenceEntry>,
    coordinates: Vec<Lab>,
    index: GridIndex,
    by_notation: HashMap<String, usize>,
    /// Entry indices per hue page, sorted by value then chroma
    pages: HashMap<u32, Vec<usize>>,
    /// Neutral entry indices sorted by value
    neutrals: Vec<usize>,
}

impl ReferenceTable {
    /// Build from entries. Notations must be unique.
    pub fn from_entries(
        source: impl Into<String>,
        entries: Vec<ReferenceEntry>,
    ) -> Result<Self, TableError> {
        let mut by_notation = HashMap::with_capacity(entries.len());
        let mut pages: HashMap<u32, Vec<usize>> = HashMap::new();
        let mut neutrals = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            let key = entry.notation.to_string();
            if by_notation.insert(key.clone(), i).is_some() {
                return Err(TableError::malformed(
                    i + 1,
                    format!("duplicate notation {key}"),
                ));
            }
            match entry.notation.hue {
                Some(hue) => pages.entry(hue.key()).or_default().push(i),
                None => neutrals.push(i),
            }
        }

        let by_value_then_chroma = |a: &usize, b: &usize| {
            let (a, b) = (&entries[*a].notation, &entries[*b].notation);
            a.value
                .total_cmp(&b.value)
                .then(a.chroma.total_cmp(&b.chroma))
        };
        for page in pages.values_mut() {
            page.sort_by(by_value_then_chroma);
        }
        neutrals.sort_by(by_value_then_chroma);

        let coordinates: Vec<Lab> = entries.iter().map(|e| e.coordinate).collect();
        let index = GridIndex::build(&coordinates, DEFAULT_CELL_SIZE);

        Ok(Self {
            source: source.into(),
            entries,
            coordinates,
            index,
            by_notation,
            pages,
            neutrals,
        })
    }

    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entries: Vec::new(),
            coordinates: Vec::new(),
            index: GridIndex::build(&[], DEFAULT_CELL_SIZE),
            by_notation: HashMap::new(),
            pages: HashMap::new(),
            neutrals: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn entry(&self, i: usize) -> &ReferenceEntry {
        &self.entries[i]
    }

    /// Exact notation lookup
    pub fn lookup(&self, notation: &MunsellNotation) -> Option<&ReferenceEntry> {
        self.by_notation
            .get(&notation.to_string())
            .map(|&i| &self.entries[i])
    }

    /// Entries of one hue page, sorted by value then chroma
    pub fn page(&self, hue: &Hue) -> impl Iterator<Item = &ReferenceEntry> {
        self.pages
            .get(&hue.key())
            .into_iter()
            .flatten()
            .map(|&i| &self.entries[i])
    }

    /// Neutral entries sorted by value
    pub fn neutrals(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.neutrals.iter().map(|&i| &self.entries[i])
    }

    /// Indices of all entries tied for nearest to `query`
    pub fn nearest(&self, query: &Lab, epsilon: f64) -> Vec<usize> {
        self.index.nearest(query, &self.coordinates, epsilon)
    }

    /// Smallest and largest value present
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.entries.iter().fold(None, |acc, e| {
            let v = e.notation.value;
            Some(match acc {
                None => (v, v),
                Some((lo, hi)) => (f64::min(lo, v), f64::max(hi, v)),
            })
        })
    }

    pub fn info(&self) -> TableInfo {
        let range = self.value_range();
        TableInfo {
            source: self.source.clone(),
            entries: self.entries.len(),
            hue_pages: self.pages.len(),
            neutral_entries: self.neutrals.len(),
            min_value: range.map(|r| r.0),
            max_value: range.map(|r| r.1),
            max_chroma: self
                .entries
                .iter()
                .map(|e| e.notation.chroma)
                .reduce(f64::max),
        }
    }
}

/// Parse a table, detecting the layout from the first data row
pub fn load(source: &str, text: &str) -> Result<ReferenceTable, TableError> {
    let comma_layout = data_lines(text)
        .next()
        .map(|(_, line)| line.contains(','))
        .unwrap_or(false);

    let entries = if comma_layout {
        parse_srgb(text, &Converter::default())?
    } else {
        parse_renotation(text)?
    };

    ReferenceTable::from_entries(source, entries)
}

/// Non-empty, non-comment lines with 1-based line numbers
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Luminance factor (percent) above which a row cannot be a reflective sample
const MAX_LUMINANCE: f64 = 110.0;
/// CIELAB bounds for plausible surface colors
const MAX_LIGHTNESS: f64 = 105.0;
const MAX_OPPONENT: f64 = 250.0;

/// Parse `h V C x y Y` rows. A header row starting with `h` is skipped.
pub fn parse_renotation(text: &str) -> Result<Vec<ReferenceEntry>, TableError> {
    let mut entries = Vec::new();

    for (line_no, line) in data_lines(text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields[0].eq_ignore_ascii_case("h") {
            continue;
        }
        if fields.len() != 6 {
            return Err(TableError::malformed(
                line_no,
                format!("expected 6 fields (h V C x y Y), found {}", fields.len()),
            ));
        }

        let number = |i: usize, name: &str| -> Result<f64, TableError> {
            fields[i]
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    TableError::malformed(line_no, format!("{name} {:?} is not a number", fields[i]))
                })
        };
        let value = number(1, "value")?;
        let chroma = number(2, "chroma")?;
        let (x, y, big_y) = (number(3, "x")?, number(4, "y")?, number(5, "Y")?);

        let notation = (if fields[0] == "N" {
            if chroma != 0.0 {
                return Err(TableError::malformed(line_no, "neutral row has chroma"));
            }
            MunsellNotation::neutral(value)
        } else {
            fields[0]
                .parse::<Hue>()
                .and_then(|hue| MunsellNotation::new(hue, value, chroma))
        })
        .map_err(|reason| TableError::malformed(line_no, reason))?;

        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) || x + y > 1.0 {
            return Err(TableError::malformed(
                line_no,
                format!("chromaticity ({x}, {y}) outside the unit triangle"),
            ));
        }
        if big_y < 0.0 {
            return Err(TableError::malformed(line_no, "luminance is negative"));
        }
        if big_y > MAX_LUMINANCE {
            return Err(TableError::malformed(
                line_no,
                format!("luminance {big_y} above {MAX_LUMINANCE}"),
            ));
        }
        if y == 0.0 && big_y > 0.0 {
            return Err(TableError::malformed(line_no, "y is zero for a non-black row"));
        }

        let xyz = Xyz::from_xyy(x, y, big_y / 100.0);
        let coordinate = Lab::from_xyz(xyz, REFERENCE_WHITE.xyz());
        if !(0.0..=MAX_LIGHTNESS).contains(&coordinate.l)
            || coordinate.a.abs() > MAX_OPPONENT
            || coordinate.b.abs() > MAX_OPPONENT
        {
            return Err(TableError::malformed(
                line_no,
                format!(
                    "not a surface color (L* {:.1}, a* {:.1}, b* {:.1})",
                    coordinate.l, coordinate.a, coordinate.b
                ),
            ));
        }

        entries.push(ReferenceEntry {
            notation,
            coordinate,
        });
    }

    Ok(entries)
}

/// Parse `notation,R,G,B` rows. A header row whose first field is not a
/// notation is skipped when it is the first data row.
pub fn parse_srgb(text: &str, converter: &Converter) -> Result<Vec<ReferenceEntry>, TableError> {
    let mut entries = Vec::new();

    for (n, (line_no, line)) in data_lines(text).enumerate() {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(TableError::malformed(
                line_no,
                format!("expected 4 fields (notation,R,G,B), found {}", fields.len()),
            ));
        }

        let notation = match fields[0].parse::<MunsellNotation>() {
            Ok(notation) => notation,
            Err(_) if n == 0 && fields[1].parse::<u8>().is_err() => continue,
            Err(reason) => return Err(TableError::malformed(line_no, reason)),
        };

        let mut channels = [0u8; 3];
        for (c, field) in channels.iter_mut().zip(&fields[1..]) {
            *c = field.parse().map_err(|_| {
                TableError::malformed(line_no, format!("channel {field:?} is not in 0..=255"))
            })?;
        }

        let [r, g, b] = channels;
        entries.push(ReferenceEntry {
            notation,
            coordinate: converter.to_perceptual(Rgb::new(r, g, b)),
        });
    }

    Ok(entries)
}
