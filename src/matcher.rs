//! Nearest-notation matching
//!
//! A query coordinate resolves to the reference entry at the smallest CIE76
//! distance. Entries within [`TIE_EPSILON`] of the best distance are broken
//! by [`MunsellNotation::tie_break_cmp`], so the outcome never depends on
//! table order.
//!
//! Queries closer to the achromatic axis than the neutral threshold resolve
//! to `N` directly. With interpolation on, value and chroma are refined
//! linearly between the bracketing entries of the matched hue page; the hue
//! itself stays on the tabulated page.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::color::Lab;
use crate::error::MatchError;
use crate::notation::MunsellNotation;
use crate::table::{ReferenceEntry, ReferenceTable};

/// Distances closer than this are treated as ties
pub const TIE_EPSILON: f64 = 1e-9;

/// Matcher settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MatchConfig {
    /// C*ab below which a query resolves to a neutral notation
    pub neutral_threshold: f64,
    /// Refine value and chroma between tabulated steps
    pub interpolate: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            neutral_threshold: 2.5,
            interpolate: false,
        }
    }
}

/// Result of a match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub notation: MunsellNotation,
    /// CIE76 distance from the query to the matched point
    pub distance: f64,
}

/// Resolve a coordinate to a notation
pub fn match_coordinate(
    coord: &Lab,
    table: &ReferenceTable,
    config: &MatchConfig,
) -> Result<Match, MatchError> {
    if table.is_empty() {
        return Err(MatchError::NoReferenceData);
    }
    let coord = sanitize(coord);

    if coord.chroma() < config.neutral_threshold {
        return Ok(match_neutral(&coord, table, config));
    }

    let entry = nearest_entry(&coord, table).ok_or(MatchError::NoReferenceData)?;
    let distance = coord.distance(&entry.coordinate);

    if entry.notation.is_neutral() {
        return Ok(if config.interpolate {
            match_neutral(&coord, table, config)
        } else {
            Match {
                notation: entry.notation,
                distance,
            }
        });
    }

    let notation = if config.interpolate {
        interpolate_on_page(&coord, entry, table)
    } else {
        entry.notation
    };

    Ok(Match { notation, distance })
}

fn sanitize(coord: &Lab) -> Lab {
    let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
    Lab::new(finite(coord.l), finite(coord.a), finite(coord.b))
}

/// Nearest entry, ties broken by notation order
fn nearest_entry<'a>(coord: &Lab, table: &'a ReferenceTable) -> Option<&'a ReferenceEntry> {
    table
        .nearest(coord, TIE_EPSILON)
        .into_iter()
        .map(|i| table.entry(i))
        .min_by(|a, b| a.notation.tie_break_cmp(&b.notation))
}

/// Neutral resolution from lightness alone
fn match_neutral(coord: &Lab, table: &ReferenceTable, config: &MatchConfig) -> Match {
    let ladder: Vec<(f64, f64)> = table
        .neutrals()
        .map(|e| (e.coordinate.l, e.notation.value))
        .collect();

    let value = if ladder.is_empty() {
        // Tables without neutral rows: ASTM D1535 value from luminance
        let (lo, hi) = table.value_range().unwrap_or((0.0, 10.0));
        let v = value_from_lightness(coord.l).clamp(lo, hi);
        if config.interpolate {
            round_tenth(v)
        } else {
            v.round().clamp(lo.ceil(), hi.floor().max(lo.ceil()))
        }
    } else if config.interpolate {
        round_tenth(interpolate_ladder(coord.l, &ladder))
    } else {
        nearest_rung(coord.l, &ladder)
    };

    let target_l = lightness_from_value(value);
    let dl = coord.l - target_l;
    Match {
        // Ladder and clamps keep `value` inside 0..=10
        notation: MunsellNotation::neutral(value.clamp(0.0, 10.0))
            .unwrap_or(MunsellNotation {
                hue: None,
                value: 0.0,
                chroma: 0.0,
            }),
        distance: (dl * dl + coord.a * coord.a + coord.b * coord.b).sqrt(),
    }
}

/// Value of the rung with the closest lightness, lower value on ties
fn nearest_rung(l: f64, ladder: &[(f64, f64)]) -> f64 {
    ladder
        .iter()
        .min_by(|a, b| {
            (a.0 - l)
                .abs()
                .total_cmp(&(b.0 - l).abs())
                .then(a.1.total_cmp(&b.1))
        })
        .map_or(0.0, |&(_, v)| v)
}

/// Linear interpolation of `y` over points sorted by ascending `x`,
/// clamped to the end points. Returns the rung value exactly at a rung.
fn interpolate_ladder(x: f64, points: &[(f64, f64)]) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return 0.0,
    };
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }

    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if x0 <= x && x <= x1 {
            if x == x0 {
                return y0;
            }
            if x == x1 {
                return y1;
            }
            let span = x1 - x0;
            if span <= 0.0 {
                return y0;
            }
            return y0 + (x - x0) / span * (y1 - y0);
        }
    }

    // Non-monotonic ladders fall back to the closest rung
    nearest_rung(x, points)
}

/// Refine value and chroma on the matched entry's hue page
fn interpolate_on_page(coord: &Lab, entry: &ReferenceEntry, table: &ReferenceTable) -> MunsellNotation {
    let Some(hue) = entry.notation.hue else {
        return entry.notation;
    };
    let page: Vec<&ReferenceEntry> = table.page(&hue).collect();

    // One lightness rung per value level, taken from the entry whose chroma
    // is closest to the matched chroma
    let mut rungs: Vec<(f64, f64)> = Vec::new();
    for level in page.chunk_by(|a, b| a.notation.value == b.notation.value) {
        let rep = level.iter().min_by(|a, b| {
            (a.notation.chroma - entry.notation.chroma)
                .abs()
                .total_cmp(&(b.notation.chroma - entry.notation.chroma).abs())
        });
        if let Some(rep) = rep {
            rungs.push((rep.coordinate.l, rep.notation.value));
        }
    }
    let value = interpolate_ladder(coord.l, &rungs);

    // Chroma ladder at the matched value level, anchored at the neutral axis
    let mut chroma_ladder: Vec<(f64, f64)> = vec![(0.0, 0.0)];
    chroma_ladder.extend(
        page.iter()
            .filter(|e| e.notation.value == entry.notation.value)
            .map(|e| (e.coordinate.chroma(), e.notation.chroma)),
    );
    let chroma = interpolate_ladder(coord.chroma(), &chroma_ladder);

    MunsellNotation {
        hue: Some(hue),
        value: round_tenth(value).clamp(0.0, 10.0),
        chroma: round_tenth(chroma).max(0.0),
    }
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// ASTM D1535 luminance factor (percent) for a Munsell value
pub fn luminance_from_value(v: f64) -> f64 {
    v * (1.1914 + v * (-0.22533 + v * (0.23352 + v * (-0.020484 + v * 0.00081939))))
}

/// CIELAB lightness of a neutral with the given Munsell value
pub fn lightness_from_value(v: f64) -> f64 {
    let y = luminance_from_value(v) / 100.0;
    if y > 216.0 / 24389.0 {
        116.0 * y.cbrt() - 16.0
    } else {
        y * 24389.0 / 27.0
    }
}

/// Munsell value for a CIELAB lightness, inverting the ASTM polynomial
pub fn value_from_lightness(l: f64) -> f64 {
    if l <= 0.0 {
        return 0.0;
    }
    let (mut lo, mut hi) = (0.0_f64, 10.0_f64);
    if l >= lightness_from_value(hi) {
        return hi;
    }
    // Monotonic on 0..=10
    for _ in 0..60 {
        let mid = (lo + hi) * 0.5;
        if lightness_from_value(mid) < l {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) * 0.5
}
