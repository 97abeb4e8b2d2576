//! Settings file loading.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::schema::SessionSettings;
use crate::error::{DecibelError, Result};

/// Load a settings file and parse it into [`SessionSettings`].
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist.
/// Returns `ConfigParseError` if the YAML is invalid.
pub fn load_settings(path: &Path) -> Result<SessionSettings> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DecibelError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            DecibelError::Io(e)
        }
    })?;

    debug!("Loaded settings from {}", path.display());
    parse_settings(&content, path)
}

/// Parse YAML content into [`SessionSettings`].
///
/// `source_path` is only used for error reporting. An empty document yields
/// the defaults.
pub fn parse_settings(content: &str, source_path: &Path) -> Result<SessionSettings> {
    if content.trim().is_empty() {
        return Ok(SessionSettings::default());
    }
    serde_yaml::from_str(content).map_err(|e| DecibelError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}
