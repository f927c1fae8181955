use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use pdfgate::render::StaticProvider;
use pdfgate::Lookup;

/// Reads a JSON object mapping identifiers to [`Lookup`] records.
pub fn load_registry(path: &Path) -> anyhow::Result<StaticProvider> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading registry file {}", path.display()))?;

    let records: HashMap<String, Lookup> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing registry file {}", path.display()))?;

    let provider: StaticProvider = records.into_iter().collect();
    log::info!(
        "loaded {} registry records from {}",
        provider.len(),
        path.display()
    );

    Ok(provider)
}
