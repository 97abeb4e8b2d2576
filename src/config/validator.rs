//! Settings validation rules.
//!
//! - `fetch` delivery needs a base URL
//! - Optimizer names must be known to the builtin registry
//! - An optimizer may appear only once in the pipeline

use std::collections::HashSet;

use crate::config::schema::{FileDeliveryMode, SessionSettings};
use crate::error::{DecibelError, Result};
use crate::optimize::OptimizerRegistry;

/// Validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    fn new(rule: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
        }
    }
}

/// Validate settings and return all errors.
pub fn check_settings(settings: &SessionSettings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if settings.file_delivery_mode == FileDeliveryMode::Fetch {
        match settings.fetch_base_url.as_deref() {
            None => errors.push(ValidationError::new(
                "missing-fetch-url",
                "file_delivery_mode is fetch but fetch_base_url is unset".to_string(),
            )),
            Some(url) if url.trim().is_empty() => errors.push(ValidationError::new(
                "missing-fetch-url",
                "fetch_base_url is empty".to_string(),
            )),
            Some(_) => {}
        }
    }

    let registry = OptimizerRegistry::with_builtins();
    let mut seen = HashSet::new();
    for optimizer in &settings.optimizers {
        if !registry.contains(&optimizer.name) {
            errors.push(ValidationError::new(
                "unknown-optimizer",
                format!(
                    "Unknown optimizer '{}' (known: {})",
                    optimizer.name,
                    registry.names().join(", ")
                ),
            ));
        }
        if !seen.insert(optimizer.name.as_str()) {
            errors.push(ValidationError::new(
                "duplicate-optimizer",
                format!("Optimizer '{}' is listed more than once", optimizer.name),
            ));
        }
    }

    errors
}

/// Validate settings, failing on the first batch of problems.
///
/// # Errors
///
/// Returns `InvalidConfiguration` with every message joined by `; `.
pub fn validate_settings(settings: &SessionSettings) -> Result<()> {
    let errors = check_settings(settings);

    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<_> = errors.iter().map(|e| e.message.clone()).collect();
        Err(DecibelError::InvalidConfiguration {
            message: messages.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;

    #[test]
    fn defaults_are_valid() {
        assert!(check_settings(&SessionSettings::default()).is_empty());
    }

    #[test]
    fn fetch_mode_requires_base_url() {
        let settings = SessionSettings {
            file_delivery_mode: FileDeliveryMode::Fetch,
            ..Default::default()
        };
        let errors = check_settings(&settings);
        assert!(errors.iter().any(|e| e.rule == "missing-fetch-url"));
    }

    #[test]
    fn unknown_optimizer_is_reported() {
        let settings = SessionSettings {
            optimizers: vec![OptimizerConfig::named("inline_everything")],
            ..Default::default()
        };
        let errors = check_settings(&settings);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, "unknown-optimizer");
        assert!(errors[0].message.contains("inline_everything"));
    }

    #[test]
    fn duplicate_optimizer_is_reported() {
        let settings = SessionSettings {
            optimizers: vec![
                OptimizerConfig::named("merge_host_groups"),
                OptimizerConfig::named("merge_host_groups"),
            ],
            ..Default::default()
        };
        let errors = check_settings(&settings);
        assert!(errors.iter().any(|e| e.rule == "duplicate-optimizer"));
    }

    #[test]
    fn validate_joins_messages() {
        let settings = SessionSettings {
            file_delivery_mode: FileDeliveryMode::Fetch,
            optimizers: vec![OptimizerConfig::named("nope")],
            ..Default::default()
        };
        let err = validate_settings(&settings).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("fetch_base_url"));
        assert!(text.contains("'nope'"));
        assert!(text.contains("; "));
    }
}
