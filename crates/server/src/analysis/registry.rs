//! Analysis registry
//!
//! Maps analysis names to factories. The registry is built before the
//! server starts and shared read-only by all sessions; each session asks
//! it for a fresh instance the first time a client names an analysis.

use std::collections::HashMap;

use super::RemoteAnalysis;

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Creates per-session analysis instances
pub trait AnalysisFactory: Send + Sync {
    fn create(&self) -> Box<dyn RemoteAnalysis>;
}

impl<F> AnalysisFactory for F
where
    F: Fn() -> Box<dyn RemoteAnalysis> + Send + Sync,
{
    fn create(&self) -> Box<dyn RemoteAnalysis> {
        self()
    }
}

/// Registry of analysis factories, keyed by analysis name
#[derive(Default)]
pub struct AnalysisRegistry {
    factories: HashMap<String, Box<dyn AnalysisFactory>>,
}

impl AnalysisRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in analyses
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtins(&mut registry, &super::builtin::EventCounts::new());
        registry
    }

    /// Register an analysis factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    /// Use `try_register` for fallible registration.
    pub fn register<F: AnalysisFactory + 'static>(&mut self, name: &str, factory: F) {
        if self.factories.contains_key(name) {
            panic!("analysis '{}' already registered", name);
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Try to register an analysis factory
    ///
    /// Returns `false` if a factory is already registered with this name.
    pub fn try_register<F: AnalysisFactory + 'static>(&mut self, name: &str, factory: F) -> bool {
        if self.factories.contains_key(name) {
            return false;
        }
        self.factories.insert(name.to_string(), Box::new(factory));
        true
    }

    /// Create a fresh instance of the named analysis
    pub fn create(&self, name: &str) -> Option<Box<dyn RemoteAnalysis>> {
        self.factories.get(name).map(|factory| factory.create())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered analysis names, sorted
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRegistry")
            .field("analyses", &self.available())
            .finish()
    }
}
