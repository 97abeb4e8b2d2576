//! File delivery steps.

use serde_yaml::{Mapping, Value};

use crate::config::FileDeliveryMode;
use crate::error::{DecibelError, Result};
use crate::session::Session;

use super::Task;

/// Directory bundled files are copied from in `bundle` mode.
pub const BUNDLE_DIR: &str = "bundle-out";

/// Put a file from the automation bundle onto the target.
///
/// In `bundle` mode this is a `copy` from `bundle-out/<src>`; in `fetch` mode
/// a `get_url` from `<fetch_base_url>/<src>`. `args` must be a mapping (or
/// null) and is passed through, typically carrying `dest` and `mode`.
pub fn get_file<'s>(session: &'s mut Session, src: &str, args: Value) -> Result<&'s mut Task> {
    let src = src.trim_start_matches('/');
    if src.is_empty() {
        return Err(DecibelError::invalid("get_file requires a source path"));
    }

    let mut mapping = match args {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        other => {
            return Err(DecibelError::invalid(format!(
                "get_file arguments must be a mapping, got {:?}",
                other
            )))
        }
    };

    let action = match session.settings().file_delivery_mode {
        FileDeliveryMode::Bundle => {
            mapping.insert("src".into(), format!("{}/{}", BUNDLE_DIR, src).into());
            "copy"
        }
        FileDeliveryMode::Fetch => {
            let base = session
                .settings()
                .fetch_base_url
                .as_deref()
                .ok_or_else(|| {
                    DecibelError::invalid("file_delivery_mode is fetch but fetch_base_url is unset")
                })?;
            let url = format!("{}/{}", base.trim_end_matches('/'), src);
            mapping.insert("url".into(), url.into());
            "get_url"
        }
    };

    session.task(action, Value::Mapping(mapping))
}
