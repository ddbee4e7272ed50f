use std::path::Path;

use serde::Deserialize;

use hatchway_common::error::Result;

/// Client asset manifest, read once at startup.
///
/// The build step of the client bundle writes a JSON manifest naming the
/// hashed css/js entrypoints; the stream prologue references them so the
/// hydrating client loads the matching bundle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub client: AssetEntry,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetEntry {
    pub css: Option<String>,
    pub js: Option<String>,
}

impl AssetManifest {
    /// Manifest with no asset references, used when no manifest path is
    /// configured.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
