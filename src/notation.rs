//! Munsell notation: hue, value and chroma
//!
//! Canonical text form is `"<step><family> <value>/<chroma>"` (e.g. `5R 4/6`)
//! for chromatic colors and `"N <value>"` for neutrals.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// The ten Munsell hue families, in circle order starting at red
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HueFamily {
    R,
    YR,
    Y,
    GY,
    G,
    BG,
    B,
    PB,
    P,
    RP,
}

impl HueFamily {
    pub const ALL: [HueFamily; 10] = [
        HueFamily::R,
        HueFamily::YR,
        HueFamily::Y,
        HueFamily::GY,
        HueFamily::G,
        HueFamily::BG,
        HueFamily::B,
        HueFamily::PB,
        HueFamily::P,
        HueFamily::RP,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HueFamily::R => "R",
            HueFamily::YR => "YR",
            HueFamily::Y => "Y",
            HueFamily::GY => "GY",
            HueFamily::G => "G",
            HueFamily::BG => "BG",
            HueFamily::B => "B",
            HueFamily::PB => "PB",
            HueFamily::P => "P",
            HueFamily::RP => "RP",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn previous(self) -> HueFamily {
        HueFamily::ALL[(self.index() + 9) % 10]
    }
}

impl FromStr for HueFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HueFamily::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown hue family {s:?}"))
    }
}

/// A chromatic hue: numeric step within a family, in (0, 10]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hue {
    pub step: f64,
    pub family: HueFamily,
}

impl Hue {
    /// Normalizes a step of 0 to step 10 of the previous family (0R == 10RP)
    pub fn new(step: f64, family: HueFamily) -> Result<Self, String> {
        if !step.is_finite() || !(0.0..=10.0).contains(&step) {
            return Err(format!("hue step {step} outside 0..10"));
        }
        if step == 0.0 {
            return Ok(Self {
                step: 10.0,
                family: family.previous(),
            });
        }
        Ok(Self { step, family })
    }

    /// Position on the hue circle in (0, 100], 10RP = 100
    pub fn number(&self) -> f64 {
        self.family.index() as f64 * 10.0 + self.step
    }

    /// Stable integer key for grouping entries of one hue page
    pub fn key(&self) -> u32 {
        (self.number() * 100.0).round() as u32
    }
}

impl fmt::Display for Hue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.step, self.family.as_str())
    }
}

impl FromStr for Hue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("hue {s:?} has no family"))?;
        let (step, family) = s.split_at(split);
        let step: f64 = step
            .parse()
            .map_err(|_| format!("hue {s:?} has no numeric step"))?;
        Hue::new(step, family.parse()?)
    }
}

/// Munsell notation. `hue` is `None` for neutrals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MunsellNotation {
    #[serde(
        serialize_with = "serialize_hue",
        deserialize_with = "deserialize_hue"
    )]
    #[schema(value_type = Option<String>, example = "5R")]
    pub hue: Option<Hue>,
    /// Lightness, 0 (black) to 10 (white)
    pub value: f64,
    /// Saturation, 0 for neutrals
    pub chroma: f64,
}

impl MunsellNotation {
    pub fn new(hue: Hue, value: f64, chroma: f64) -> Result<Self, String> {
        validate_value(value)?;
        if !chroma.is_finite() || chroma < 0.0 {
            return Err(format!("chroma {chroma} is negative"));
        }
        Ok(Self {
            hue: Some(hue),
            value,
            chroma,
        })
    }

    pub fn neutral(value: f64) -> Result<Self, String> {
        validate_value(value)?;
        Ok(Self {
            hue: None,
            value,
            chroma: 0.0,
        })
    }

    pub fn is_neutral(&self) -> bool {
        self.hue.is_none()
    }

    /// Hue column text: the hue (`5R`) or `N`
    pub fn hue_label(&self) -> String {
        match &self.hue {
            Some(hue) => hue.to_string(),
            None => "N".to_string(),
        }
    }

    /// Deterministic order for equidistant matches: hue sector (neutral
    /// first), then chroma, then value.
    pub fn tie_break_cmp(&self, other: &Self) -> Ordering {
        let sector = |n: &Self| n.hue.map_or(0.0, |h| h.number());
        sector(self)
            .total_cmp(&sector(other))
            .then(self.chroma.total_cmp(&other.chroma))
            .then(self.value.total_cmp(&other.value))
    }
}

fn validate_value(value: f64) -> Result<(), String> {
    if !value.is_finite() || !(0.0..=10.0).contains(&value) {
        return Err(format!("value {value} outside 0..10"));
    }
    Ok(())
}

impl fmt::Display for MunsellNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hue {
            Some(hue) => write!(f, "{} {}/{}", hue, self.value, self.chroma),
            None => write!(f, "N {}", self.value),
        }
    }
}

impl FromStr for MunsellNotation {
    type Err = String;

    /// Accepts `5R 4/6`, `5R4/6`, `N 5`, `N5` and `N 5/0`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let number = |t: &str| -> Result<f64, String> {
            t.trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid number {t:?} in notation {s:?}"))
        };

        if let Some(rest) = s.strip_prefix('N') {
            let value = match rest.split_once('/') {
                Some((value, chroma)) => {
                    let chroma = chroma.trim();
                    if !chroma.is_empty() && number(chroma)? != 0.0 {
                        return Err(format!("neutral notation {s:?} has chroma"));
                    }
                    value
                }
                None => rest,
            };
            return MunsellNotation::neutral(number(value)?);
        }

        let (hue_value, chroma) = s
            .split_once('/')
            .ok_or_else(|| format!("notation {s:?} is missing '/'"))?;
        let hue_end = hue_value
            .rfind(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| format!("notation {s:?} is missing a hue"))?;
        let (hue, value) = hue_value.split_at(hue_end + 1);
        MunsellNotation::new(hue.parse()?, number(value)?, number(chroma)?)
    }
}

fn serialize_hue<S: Serializer>(hue: &Option<Hue>, serializer: S) -> Result<S::Ok, S::Error> {
    match hue {
        Some(hue) => serializer.serialize_some(&hue.to_string()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_hue<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Hue>, D::Error> {
    Option::<String>::deserialize(deserializer)?
        .map(|s| s.parse().map_err(serde::de::Error::custom))
        .transpose()
}
