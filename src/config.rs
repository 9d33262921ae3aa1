//! Startup configuration from environment variables

use std::str::FromStr;

use crate::color::{ConverterConfig, Transfer, WhitePoint};
use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::matcher::MatchConfig;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    /// Table path or URL; `None` selects the builtin table
    pub table: Option<String>,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            table: None,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup. Unset or blank variables keep their
    /// defaults; anything else must parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let white_point: WhitePoint = parse_var(&get, "MUNSELL_WHITE_POINT")?
            .unwrap_or(defaults.engine.converter.white_point);
        let transfer: Transfer =
            parse_var(&get, "MUNSELL_TRANSFER")?.unwrap_or(defaults.engine.converter.transfer);

        let neutral_threshold: f64 = parse_var(&get, "MUNSELL_NEUTRAL_THRESHOLD")?
            .unwrap_or(defaults.engine.matcher.neutral_threshold);
        if !neutral_threshold.is_finite() || neutral_threshold < 0.0 {
            return Err(ConfigError {
                var: "MUNSELL_NEUTRAL_THRESHOLD",
                value: neutral_threshold.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }

        let interpolate = match get("MUNSELL_INTERPOLATE") {
            None => defaults.engine.matcher.interpolate,
            Some(v) => parse_bool(&v).ok_or_else(|| ConfigError {
                var: "MUNSELL_INTERPOLATE",
                value: v.clone(),
                reason: "expected true/false, 1/0, yes/no or on/off".to_string(),
            })?,
        };

        Ok(Self {
            port: parse_var(&get, "PORT")?.unwrap_or(defaults.port),
            table: get("MUNSELL_TABLE").map(|t| t.trim().to_string()),
            engine: EngineConfig {
                converter: ConverterConfig {
                    white_point,
                    transfer,
                },
                matcher: MatchConfig {
                    neutral_threshold,
                    interpolate,
                },
            },
        })
    }
}

fn parse_var<T>(get: impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    get(var)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError {
                var,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
