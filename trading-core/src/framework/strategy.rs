use crate::framework::context::ExecutionContext;
use crate::framework::parameters::{ParameterSchema, ParameterSpec, Parameters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use trading::{Entity, MarketSnapshot, Position, Result, Signal};

/// The core trait that all strategies implement.
///
/// A strategy is owned by exactly one execution task, so hooks take `&mut self` freely.
/// Errors (and panics) raised from a hook are isolated to that execution.
pub trait Strategy: Send {
    /// Called once before the first iteration. An error moves the execution to `ERROR`.
    fn initialize(&mut self, _ctx: &ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// Turns a market snapshot into zero or more signals, in the order they should be routed.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The execution's context, refreshed from portfolio state for this iteration.
    /// * `snapshot` - Latest quotes for the subscribed symbols.
    fn generate_signals(
        &mut self,
        ctx: &ExecutionContext,
        snapshot: &MarketSnapshot,
    ) -> Result<Vec<Signal>>;

    /// Optional quantity suggested by the strategy itself.
    ///
    /// The risk gate never sizes above it, but may size below.
    fn size_position(&self, _signal: &Signal, _ctx: &ExecutionContext) -> Option<f64> {
        None
    }

    /// Whether an open position should be closed at `price`.
    fn should_exit(&self, _position: &Position, _price: f64, _ctx: &ExecutionContext) -> bool {
        false
    }

    /// Called exactly once when the execution stops.
    fn cleanup(&mut self, _ctx: &ExecutionContext) {}
}

pub type StrategyFactory = Arc<dyn Fn(&Parameters) -> Result<Box<dyn Strategy>> + Send + Sync>;

/// A registered strategy implementation. Immutable once registered.
#[derive(Clone)]
pub struct StrategyDefinition {
    name: String,
    description: String,
    version: String,
    schema: ParameterSchema,
    factory: StrategyFactory,
}

impl StrategyDefinition {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Parameters) -> Result<Box<dyn Strategy>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            version: "1.0".to_string(),
            schema: ParameterSchema::new(),
            factory: Arc::new(factory),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.schema = self.schema.with(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Builds a fresh strategy instance from already-resolved parameters.
    pub fn instantiate(&self, parameters: &Parameters) -> Result<Box<dyn Strategy>> {
        (self.factory)(parameters)
    }

    pub fn info(&self) -> StrategyInfo {
        StrategyInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            schema: self.schema.clone(),
            registered_at: Utc::now(),
        }
    }
}

impl fmt::Debug for StrategyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("parameters", &self.schema.specs().len())
            .finish()
    }
}

/// Serializable description of a [`StrategyDefinition`], for listing and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub schema: ParameterSchema,
    pub registered_at: DateTime<Utc>,
}

impl Entity for StrategyInfo {
    fn entity_id(&self) -> String {
        self.name.clone()
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}
