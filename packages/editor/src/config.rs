use serde::{Deserialize, Serialize};

use crate::errors::EditorError;

/// Built-in plugin names, in setup order
pub const BUILTIN_PLUGINS: [&str; 6] = ["rich-text", "list", "embed", "code-quote", "collapsible", "history"];

/// Editor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Deepest list nesting reachable by indenting
    pub max_indent_depth: usize,

    /// Undo steps kept before the oldest is evicted
    pub history_capacity: usize,

    /// Keystrokes closer together than this share an undo step
    pub coalesce_window_ms: u64,

    /// Quiet period after the last content change before saving
    pub autosave_debounce_ms: u64,

    /// Persistence calls running longer than this fail with a timeout
    pub save_timeout_ms: u64,

    pub preview_max_length: usize,

    /// UI placeholder text that never belongs in a preview
    pub preview_excluded_phrases: Vec<String>,

    /// Width available to decorators, in pixels
    pub container_width: u32,

    pub asset: AssetConfig,

    pub enabled_plugins: Vec<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_indent_depth: 7,
            history_capacity: 100,
            coalesce_window_ms: 1000,
            autosave_debounce_ms: 2500,
            save_timeout_ms: 10_000,
            preview_max_length: 150,
            preview_excluded_phrases: vec!["Enter a caption...".to_string(), "Collapsible title".to_string()],
            container_width: 800,
            asset: AssetConfig::default(),
            enabled_plugins: BUILTIN_PLUGINS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl EditorConfig {
    pub fn from_json(source: &str) -> Result<Self, EditorError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.enabled_plugins.iter().any(|p| p == name)
    }
}

/// Limits on inserted media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetConfig {
    /// Decoded size limit in bytes
    pub max_bytes: usize,

    /// Accepted mime types
    pub allowed_types: Vec<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            allowed_types: ["image/png", "image/jpeg", "image/gif", "image/webp"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_config() {
        let json = r#"{
            "maxIndentDepth": 3,
            "containerWidth": 640,
            "asset": { "maxBytes": 1024 }
        }"#;

        let config = EditorConfig::from_json(json).unwrap();
        assert_eq!(config.max_indent_depth, 3);
        assert_eq!(config.container_width, 640);
        assert_eq!(config.asset.max_bytes, 1024);
        assert_eq!(config.asset.allowed_types.len(), 4);
        assert_eq!(config.autosave_debounce_ms, 2500);
    }

    #[test]
    fn test_default_config() {
        let config = EditorConfig::default();
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.preview_max_length, 150);
        assert!(config.plugin_enabled("list"));
        assert!(!config.plugin_enabled("spellcheck"));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = EditorConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert!(json.contains("\"coalesceWindowMs\": 1000"));
        assert_eq!(EditorConfig::from_json(&json).unwrap(), config);
    }
}
