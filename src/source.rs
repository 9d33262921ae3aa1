//! Reference table sources
//!
//! A table comes from the copy compiled into the binary, a local file, or an
//! HTTP(S) URL. Each source yields the raw text; parsing is the table
//! module's job.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::TableError;
use crate::table::{self, ReferenceTable};

/// Renotation table shipped with the binary
pub const BUILTIN_TABLE: &str = include_str!("../data/munsell_renotation.dat");

/// Where reference table text comes from
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Human-readable origin, reported by `/table`
    fn describe(&self) -> String;

    /// Fetch the raw table text
    async fn fetch(&self) -> Result<String, TableError>;
}

pub struct BuiltinSource;

#[async_trait]
impl TableSource for BuiltinSource {
    fn describe(&self) -> String {
        "builtin".to_string()
    }

    async fn fetch(&self) -> Result<String, TableError> {
        Ok(BUILTIN_TABLE.to_string())
    }
}

pub struct FileSource {
    path: String,
}

impl FileSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TableSource for FileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    async fn fetch(&self) -> Result<String, TableError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| TableError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TableSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<String, TableError> {
        tracing::info!("Fetching reference table from: {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "text/plain")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TableError::Fetch(format!(
                "{} returned status: {}",
                self.url,
                response.status()
            )));
        }

        Ok(response.text().await?)
    }
}

/// Pick a source for a configured table setting: `None` is the builtin
/// table, `http://` and `https://` are URLs, anything else is a path.
pub fn source_from_setting(setting: Option<&str>, client: Client) -> Box<dyn TableSource> {
    match setting.map(str::trim).filter(|s| !s.is_empty()) {
        None => Box::new(BuiltinSource),
        Some(s) if s.starts_with("http://") || s.starts_with("https://") => {
            Box::new(HttpSource::new(client, s))
        }
        Some(s) => Box::new(FileSource::new(s)),
    }
}

/// Fetch and parse a table
pub async fn load_table(source: &dyn TableSource) -> Result<ReferenceTable, TableError> {
    let name = source.describe();
    let text = source.fetch().await?;
    let table = table::load(&name, &text)?;

    tracing::info!(
        "Loaded reference table from {} ({} entries)",
        name,
        table.len()
    );
    if table.is_empty() {
        tracing::warn!("Reference table {} has no entries", name);
    }

    Ok(table)
}
