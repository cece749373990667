use crate::framework::context::ExecutionContext;
use crate::framework::runner_manager::ExecutionRequest;
use crate::framework::strategy::{Strategy, StrategyDefinition, StrategyInfo};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use trading::{ExecutionId, Result, TradingError};

/// Registry of strategy implementations, populated explicitly at startup.
#[derive(Default)]
pub struct StrategyRegistry {
    definitions: RwLock<HashMap<String, Arc<StrategyDefinition>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under its name.
    ///
    /// Registering the same name twice replaces the previous definition and logs a warning.
    ///
    /// # Returns
    ///
    /// * `true` if an existing definition was replaced.
    pub fn register(&self, definition: StrategyDefinition) -> bool {
        let name = definition.name().to_string();
        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let replaced = definitions.insert(name.clone(), Arc::new(definition)).is_some();
        if replaced {
            warn!("Strategy '{}' was already registered, overwriting", name);
        } else {
            info!("Registered strategy '{}'", name);
        }
        replaced
    }

    /// Removes a definition. Running executions keep the instance they were built from.
    ///
    /// # Returns
    ///
    /// * `true` if the name was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            info!("Unregistered strategy '{}'", name);
        }
        removed
    }

    /// Looks a definition up by name.
    ///
    /// # Returns
    ///
    /// * `Some(definition)` if found.
    /// * `None` if no strategy is registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Arc<StrategyDefinition>> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Builds a fresh strategy instance and its context for `request`, under a new id.
    ///
    /// # Returns
    ///
    /// * `Err(TradingError::Validation)` for an unknown strategy, no symbols, or bad parameters.
    pub fn instantiate(&self, request: &ExecutionRequest) -> Result<(ExecutionContext, Box<dyn Strategy>)> {
        let Some(definition) = self.lookup(&request.strategy) else {
            return Err(TradingError::validation(format!(
                "strategy '{}' is not registered",
                request.strategy
            )));
        };
        if request.symbols.is_empty() {
            return Err(TradingError::validation("an execution needs at least one symbol"));
        }

        let parameters = definition.schema().resolve(&request.parameters)?;
        let strategy = definition.instantiate(&parameters)?;
        let context = ExecutionContext::new(
            ExecutionId::new(),
            definition.name(),
            request.owner.clone(),
            request.symbols.clone(),
            parameters,
        );
        Ok((context, strategy))
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn infos(&self) -> Vec<StrategyInfo> {
        let mut infos: Vec<StrategyInfo> = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|d| d.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
