use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use bk_schemas::ProductType;

/// Session configuration: the fixed product catalog the demo purchases from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Product ids offered by this app. `buy_first_configured` uses the
    /// first entry.
    pub product_ids: Vec<String>,
    pub product_type: ProductType,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            product_ids: vec!["YOUR_PRODUCT_ID".to_string()],
            product_type: ProductType::InApp,
        }
    }
}

impl SessionConfig {
    /// Load a config from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read session config {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("parse session config {:?}", path))
    }
}
