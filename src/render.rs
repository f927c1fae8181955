//! Collaborators the gate hands work to: the document renderer and the
//! lookup data provider.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest output accepted as a real PDF. Anything shorter is a blank or
/// truncated document.
pub const MIN_PDF_BYTES: usize = 1000;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,

    /// Set when the failure shows the handle itself is gone (for example a
    /// lost browser connection) rather than a problem with this document.
    pub handle_dead: bool,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            handle_dead: false,
        }
    }

    pub fn handle_dead(mut self, dead: bool) -> Self {
        self.handle_dead = dead;
        self
    }
}

/// Turns resolved HTML into a binary document using a shared handle `H`.
#[async_trait]
pub trait DocumentRenderer<H: Sync>: Send + Sync {
    async fn render(&self, handle: &H, html: &str) -> Result<Vec<u8>, RenderError>;
}

/// Rejects output too small to be a usable PDF.
pub fn check_document(bytes: Vec<u8>) -> Result<Vec<u8>, RenderError> {
    if bytes.len() < MIN_PDF_BYTES {
        return Err(RenderError::new(format!(
            "document is only {} bytes (expected at least {})",
            bytes.len(),
            MIN_PDF_BYTES
        )));
    }

    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("No record for {0}")]
    NotFound(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Structured result of an identifier lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    pub name: String,

    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn lookup(&self, id: &str) -> Result<Lookup, ProviderError>;
}

/// In-memory provider keyed by the digits of the identifier, so
/// `12.345.678/0001-90` and `12345678000190` find the same record.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    records: HashMap<String, Lookup>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, id: &str, lookup: Lookup) -> Self {
        self.records.insert(normalize_id(id), lookup);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(String, Lookup)> for StaticProvider {
    fn from_iter<I: IntoIterator<Item = (String, Lookup)>>(iter: I) -> Self {
        Self {
            records: iter
                .into_iter()
                .map(|(id, lookup)| (normalize_id(&id), lookup))
                .collect(),
        }
    }
}

#[async_trait]
impl DataProvider for StaticProvider {
    async fn lookup(&self, id: &str) -> Result<Lookup, ProviderError> {
        let key = normalize_id(id);
        if key.is_empty() {
            return Err(ProviderError::NotFound(id.to_string()));
        }

        self.records
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }
}

fn normalize_id(id: &str) -> String {
    id.chars().filter(char::is_ascii_digit).collect()
}
