//! Typed strategy parameters and the schema they are validated against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use trading::{Result, TradingError};

/// The value of a parameter.
///
/// Untagged so configuration files can write plain `short_window = 20`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Integer(i) => Some(*i as f64),
            ParameterValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(i) => Some(*i),
            ParameterValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ParameterValue::Boolean(_) => "boolean",
            ParameterValue::Integer(_) => "integer",
            ParameterValue::Float(_) => "float",
            ParameterValue::String(_) => "string",
        }
    }

    /// Whether `other` can stand in for a parameter declared with `self`'s type.
    /// Integers are accepted where floats are declared.
    fn accepts(&self, other: &ParameterValue) -> bool {
        matches!(
            (self, other),
            (ParameterValue::Boolean(_), ParameterValue::Boolean(_))
                | (ParameterValue::Integer(_), ParameterValue::Integer(_))
                | (ParameterValue::Float(_), ParameterValue::Float(_))
                | (ParameterValue::Float(_), ParameterValue::Integer(_))
                | (ParameterValue::String(_), ParameterValue::String(_))
        )
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Boolean(b) => write!(f, "{}", b),
            ParameterValue::Integer(i) => write!(f, "{}", i),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Integer(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Boolean(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

/// Declaration of one parameter a strategy understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    name: String,
    description: String,
    default: ParameterValue,
    min: Option<f64>,
    max: Option<f64>,
}

impl ParameterSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<ParameterValue>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default: default.into(),
            min: None,
            max: None,
        }
    }

    /// Restricts numeric values to `[min, max]`.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_value(&self) -> &ParameterValue {
        &self.default
    }

    fn check(&self, value: &ParameterValue) -> Result<()> {
        if !self.default.accepts(value) {
            return Err(TradingError::validation(format!(
                "parameter '{}' expects a {}, got {}",
                self.name,
                self.default.kind(),
                value.kind()
            )));
        }
        if let Some(v) = value.as_f64() {
            if let Some(min) = self.min {
                if v < min {
                    return Err(TradingError::validation(format!(
                        "parameter '{}' = {} is below the minimum {}",
                        self.name, v, min
                    )));
                }
            }
            if let Some(max) = self.max {
                if v > max {
                    return Err(TradingError::validation(format!(
                        "parameter '{}' = {} is above the maximum {}",
                        self.name, v, max
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The full set of parameters a strategy declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    specs: Vec<ParameterSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, spec: ParameterSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Validates supplied values and fills in defaults for the rest.
    ///
    /// Unknown names, type mismatches and out-of-range numbers are validation errors.
    pub fn resolve(&self, supplied: &HashMap<String, ParameterValue>) -> Result<Parameters> {
        for name in supplied.keys() {
            if self.get(name).is_none() {
                return Err(TradingError::validation(format!(
                    "unknown parameter '{}'",
                    name
                )));
            }
        }

        let mut values = HashMap::with_capacity(self.specs.len());
        for spec in &self.specs {
            let value = match supplied.get(&spec.name) {
                Some(value) => {
                    spec.check(value)?;
                    value.clone()
                }
                None => spec.default.clone(),
            };
            values.insert(spec.name.clone(), value);
        }
        Ok(Parameters { values })
    }
}

/// Resolved parameter values of one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    values: HashMap<String, ParameterValue>,
}

impl Parameters {
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    pub fn usize_or(&self, name: &str, default: usize) -> usize {
        self.get(name)
            .and_then(|v| v.as_i64())
            .filter(|v| *v >= 0)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).and_then(|v| v.as_str()).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.values.iter()
    }
}
