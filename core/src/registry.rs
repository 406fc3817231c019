//! Registry of mining engine bindings

use crate::config::EngineSettings;
use crate::engine::{DryRunEngine, MiningEngine, SubprocessEngine};
use crate::error::EngineError;
use std::collections::HashMap;

/// Factory type: engine settings → engine instance
pub type EngineFactory =
    Box<dyn Fn(&EngineSettings) -> Result<Box<dyn MiningEngine>, EngineError> + Send + Sync>;

/// Engines selectable by name from configuration
pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `gspan` (subprocess) and `dry-run` engines
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("gspan", |settings| {
            Ok(Box::new(SubprocessEngine::from_settings(settings)?) as Box<dyn MiningEngine>)
        });
        registry.register("dry-run", |_| Ok(Box::new(DryRunEngine) as Box<dyn MiningEngine>));
        registry
    }

    /// Register a factory under an engine name, replacing any previous one
    ///
    /// # Example
    /// ```
    /// use conngraph_core::{DryRunEngine, EngineRegistry, EngineSettings, MiningEngine};
    ///
    /// let mut registry = EngineRegistry::new();
    /// registry.register("check", |_| Ok(Box::new(DryRunEngine) as Box<dyn MiningEngine>));
    /// let settings = EngineSettings { name: "check".into(), ..Default::default() };
    /// assert_eq!(registry.build(&settings).unwrap().name(), "dry-run");
    /// ```
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&EngineSettings) -> Result<Box<dyn MiningEngine>, EngineError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Build the engine named by `settings.name`
    pub fn build(&self, settings: &EngineSettings) -> Result<Box<dyn MiningEngine>, EngineError> {
        let factory = self
            .factories
            .get(&settings.name)
            .ok_or_else(|| EngineError::UnknownEngine(settings.name.clone()))?;

        factory(settings)
    }

    /// Check if an engine is registered
    pub fn has_engine(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered engine names, sorted
    pub fn engines(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
