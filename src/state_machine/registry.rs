//! Named state functions addressable as `<module>?<function>`

use super::StateFn;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Why a `<module>?<function>` command could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Module {0} not found! Back to default state")]
    ModuleNotFound(String),
    #[error("State function {function} not found in {module}! Back to default state")]
    FunctionNotFound { module: String, function: String },
}

/// A group of state functions registered under one module name
#[derive(Debug, Clone, Default)]
pub struct StateModule {
    functions: HashMap<String, StateFn>,
}

impl StateModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `state` under its own name
    #[must_use]
    pub fn with(mut self, state: StateFn) -> Self {
        self.functions.insert(state.name().to_string(), state);
        self
    }

    pub fn get(&self, function: &str) -> Option<&StateFn> {
        self.functions.get(function)
    }
}

/// Registry of state modules, shared by every conversation
#[derive(Debug, Default)]
pub struct StateRegistry {
    modules: RwLock<Arc<HashMap<String, StateModule>>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, module: StateModule) {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut modules).insert(name.into(), module);
    }

    /// Replace every module at once; lookups see the old or the new set
    pub fn reload(&self, modules: HashMap<String, StateModule>) {
        tracing::info!(modules = modules.len(), "Reloading state registry");
        *self.modules.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(modules);
    }

    pub fn lookup(&self, module: &str, function: &str) -> Result<StateFn, LookupError> {
        let modules = Arc::clone(&self.modules.read().unwrap_or_else(PoisonError::into_inner));
        let found = modules
            .get(module)
            .ok_or_else(|| LookupError::ModuleNotFound(module.to_string()))?;
        found
            .get(function)
            .cloned()
            .ok_or_else(|| LookupError::FunctionNotFound {
                module: module.to_string(),
                function: function.to_string(),
            })
    }
}
