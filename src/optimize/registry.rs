//! Optimizer registry.
//!
//! The [`OptimizerRegistry`] maps optimizer names to constructors and turns
//! the configured list into a pipeline.

use indexmap::IndexMap;
use tracing::debug;

use super::{FactGathering, MergeHostGroups, Optimizer};
use crate::config::OptimizerConfig;
use crate::error::{DecibelError, Result};
use crate::units::Attributes;

/// Builds an optimizer from its settings map.
pub type OptimizerFactory = fn(&Attributes) -> Result<Box<dyn Optimizer>>;

/// Registry of available optimizers, in registration order.
pub struct OptimizerRegistry {
    factories: IndexMap<String, OptimizerFactory>,
}

impl OptimizerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Create a registry with the built-in optimizers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(FactGathering::NAME, build_fact_gathering);
        registry.register(MergeHostGroups::NAME, build_merge_host_groups);
        registry
    }

    /// Register an optimizer constructor, replacing any with the same name.
    pub fn register(&mut self, name: impl Into<String>, factory: OptimizerFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct one optimizer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for an unknown name or settings the
    /// optimizer rejects.
    pub fn build(&self, config: &OptimizerConfig) -> Result<Box<dyn Optimizer>> {
        let factory = self.factories.get(&config.name).ok_or_else(|| {
            DecibelError::invalid(format!("Unknown optimizer '{}'", config.name))
        })?;
        debug!("Building optimizer {}", config.name);
        factory(&config.settings)
    }

    /// Construct the configured pipeline, preserving order.
    pub fn pipeline(&self, configs: &[OptimizerConfig]) -> Result<Vec<Box<dyn Optimizer>>> {
        configs.iter().map(|config| self.build(config)).collect()
    }

    /// Get the number of registered optimizers.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

fn build_fact_gathering(settings: &Attributes) -> Result<Box<dyn Optimizer>> {
    Ok(Box::new(FactGathering::from_settings(settings)?))
}

fn build_merge_host_groups(settings: &Attributes) -> Result<Box<dyn Optimizer>> {
    Ok(Box::new(MergeHostGroups::from_settings(settings)?))
}

impl Default for OptimizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
