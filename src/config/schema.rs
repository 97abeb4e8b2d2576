//! Session settings.
//!
//! These map to the YAML settings file accepted by
//! [`load_settings`](super::load_settings). Every field has a default, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::units::Attributes;

/// Settings for one automation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Target every host group at `localhost` over a local connection
    pub localhost_only: bool,

    /// How `get_file` steps deliver files
    pub file_delivery_mode: FileDeliveryMode,

    /// Base URL for `fetch` delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_base_url: Option<String>,

    /// Optimizer pipeline, run in order
    #[serde(default = "default_optimizers")]
    pub optimizers: Vec<OptimizerConfig>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            localhost_only: true,
            file_delivery_mode: FileDeliveryMode::default(),
            fetch_base_url: None,
            optimizers: default_optimizers(),
        }
    }
}

fn default_optimizers() -> Vec<OptimizerConfig> {
    vec![
        OptimizerConfig::named("fact_gathering"),
        OptimizerConfig::named("merge_host_groups"),
    ]
}

/// File delivery mode for `get_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileDeliveryMode {
    /// Copy from the bundle shipped alongside the plan
    #[default]
    Bundle,
    /// Download from `fetch_base_url`
    Fetch,
}

/// One optimizer in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub settings: Attributes,
}

impl OptimizerConfig {
    /// An optimizer with no settings.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Attributes::new(),
        }
    }
}

/// JSON Schema (Draft-07) for the settings file.
pub fn settings_schema() -> serde_json::Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Decibel Session Settings",
        "type": "object",
        "properties": {
            "localhost_only": {
                "type": "boolean",
                "default": true,
                "description": "Target localhost over a local connection"
            },
            "file_delivery_mode": {
                "type": "string",
                "enum": ["bundle", "fetch"],
                "default": "bundle",
                "description": "How get_file delivers files"
            },
            "fetch_base_url": {
                "type": "string",
                "description": "Base URL used in fetch mode"
            },
            "optimizers": optimizers_schema()
        },
        "additionalProperties": false
    })
}

fn optimizers_schema() -> serde_json::Value {
    json!({
        "type": "array",
        "description": "Optimizer pipeline, run in order",
        "default": [
            { "name": "fact_gathering" },
            { "name": "merge_host_groups" }
        ],
        "items": {
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {
                    "type": "string",
                    "enum": ["fact_gathering", "merge_host_groups"]
                },
                "settings": {
                    "type": "object",
                    "description": "Optimizer-specific settings"
                }
            },
            "additionalProperties": false
        }
    })
}
