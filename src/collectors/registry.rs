//! Name → module lookup.
//!
//! The registry is an ordinary value built at startup from an explicit list of
//! constructors and then shared behind an `Arc`. Nothing registers itself.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use thiserror::Error;

use crate::collectors::module::{Module, ModuleParams, RunSummary};
use crate::constants::ALL_MODULES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module not found: {0}")]
    NotFound(String),
}

#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of modules, later entries winning.
    pub fn from_modules(modules: Vec<Arc<dyn Module>>) -> Self {
        let mut registry = Self::new();
        for module in modules {
            registry.register_arc(module);
        }
        registry
    }

    /// Insert `module` under its own name. Re-registering a name replaces the
    /// previous module, which is returned.
    pub fn register<M: Module + 'static>(&mut self, module: M) -> Option<Arc<dyn Module>> {
        self.register_arc(Arc::new(module))
    }

    pub fn register_arc(&mut self, module: Arc<dyn Module>) -> Option<Arc<dyn Module>> {
        let name = module.name().to_string();
        let previous = self.modules.insert(name.clone(), module);
        if previous.is_some() {
            warn!("Module '{}' registered twice, keeping the last registration", name);
        } else {
            debug!("Registered module '{}'", name);
        }
        previous
    }

    /// Every registered name, sorted.
    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.all_names()
            .into_iter()
            .filter_map(|name| {
                let description = self.modules.get(&name)?.description().to_string();
                Some((name, description))
            })
            .collect()
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolve `name` and run it.
    ///
    /// An unknown name yields [`RegistryError::NotFound`] inside the returned
    /// `anyhow::Error` and runs nothing.
    pub fn run_by_name(&self, name: &str, params: &ModuleParams) -> Result<RunSummary> {
        let module = self
            .resolve(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        module.run(params)
    }

    /// Expand a user selection into module names.
    ///
    /// `all` (anywhere in the list) selects every registered module. Names are
    /// trimmed, empty entries dropped, and duplicates removed while keeping the
    /// first occurrence. Unknown names are kept so the dispatcher can report
    /// them as failed.
    pub fn expand_selection<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let requested: Vec<&str> = requested
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();

        if requested.iter().any(|s| s.eq_ignore_ascii_case(ALL_MODULES)) {
            return self.all_names();
        }

        let mut selected: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            if !selected.iter().any(|s| s == name) {
                selected.push(name.to_string());
            }
        }
        selected
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.all_names())
            .finish()
    }
}
