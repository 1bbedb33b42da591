use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Serialize)]
struct TokenFile {
    #[serde(default)]
    tokens: BTreeMap<u32, String>,
}

/// Loads saved `uid -> token` pairs; a missing file is an empty store.
pub fn load(path: &Path) -> Result<BTreeMap<u32, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file: TokenFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(file.tokens)
}

pub fn save(path: &Path, tokens: &BTreeMap<u32, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = TokenFile {
        tokens: tokens.clone(),
    };
    let contents = serde_json::to_string_pretty(&file)?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
