//! Munsell color picker service
//!
//! Classifies display pixels into Munsell notation against a renotation
//! table and keeps an exportable log of captured colors.

pub mod api;
pub mod capture;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod history;
pub mod index;
pub mod matcher;
pub mod notation;
pub mod sampler;
pub mod source;
pub mod swatch;
pub mod table;
