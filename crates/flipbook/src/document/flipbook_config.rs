//! Flipbook display settings.
//!
//! The conversion pipeline never interprets these; it only carries them
//! (and copies them on deduplication). Application-wide defaults come from
//! the config file, documents may override individual keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlipbookConfig {
    pub width: u32,
    pub height: u32,
    pub background_color: String,
    pub show_controls: bool,
    pub show_page_numbers: bool,
    pub enable_zoom: bool,
    pub enable_fullscreen: bool,
    pub autoplay: bool,
    pub autoplay_delay: u32,
    pub enable_keyboard: bool,
    pub enable_touch: bool,
    pub animation_duration: u32,
}

impl Default for FlipbookConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            background_color: "#ffffff".to_string(),
            show_controls: true,
            show_page_numbers: true,
            enable_zoom: true,
            enable_fullscreen: true,
            autoplay: false,
            autoplay_delay: 3000,
            enable_keyboard: true,
            enable_touch: true,
            animation_duration: 500,
        }
    }
}

/// Document-level overrides: a flat key/value map using the camelCase
/// option names of [`FlipbookConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlipbookOverrides(pub BTreeMap<String, Value>);

impl FlipbookOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FlipbookConfig {
    /// Layers `overrides` on top of `self`. Unknown keys and values that do
    /// not fit the option's type are ignored, one key at a time.
    pub fn with_overrides(&self, overrides: &FlipbookOverrides) -> FlipbookConfig {
        let mut current = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => return self.clone(),
        };

        for (key, value) in &overrides.0 {
            if !current.contains_key(key) {
                tracing::debug!("Ignoring unknown flipbook option '{}'", key);
                continue;
            }
            let mut candidate = current.clone();
            candidate.insert(key.clone(), value.clone());
            if serde_json::from_value::<FlipbookConfig>(Value::Object(candidate.clone())).is_ok() {
                current = candidate;
            } else {
                tracing::debug!("Ignoring invalid value for flipbook option '{}'", key);
            }
        }

        serde_json::from_value(Value::Object(current)).unwrap_or_else(|_| self.clone())
    }
}
