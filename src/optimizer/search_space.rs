//! Search space definition for hyperparameters

use std::collections::BTreeMap;
use std::fmt;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float { low: f64, high: f64, log_scale: bool },
    /// One of a fixed set of strings
    Categorical { choices: Vec<String> },
}

/// A single hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: false,
            },
        }
    }

    /// Float sampled uniformly in log space
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: true,
            },
        }
    }

    pub fn categorical(name: impl Into<String>, choices: &[&str]) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float {
                low,
                high,
                log_scale,
            } => {
                let val = if *log_scale {
                    let (log_low, log_high) = (low.ln(), high.ln());
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val.clamp(*low, *high))
            }
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::String(choices[idx].clone())
            }
        }
    }

    /// Distance between two values of this parameter, scaled to `[0, 1]`
    pub fn distance(&self, a: &ParameterValue, b: &ParameterValue) -> f64 {
        match (&self.param_type, a, b) {
            (
                ParameterType::Float {
                    low,
                    high,
                    log_scale,
                },
                ParameterValue::Float(va),
                ParameterValue::Float(vb),
            ) => {
                let (va, vb, low, high) = if *log_scale {
                    (va.ln(), vb.ln(), low.ln(), high.ln())
                } else {
                    (*va, *vb, *low, *high)
                };
                let span = high - low;
                if span > 0.0 {
                    ((va - vb) / span).abs().min(1.0)
                } else {
                    0.0
                }
            }
            (ParameterType::Categorical { .. }, ParameterValue::String(va), ParameterValue::String(vb)) => {
                if va == vb {
                    0.0
                } else {
                    1.0
                }
            }
            _ => 1.0,
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    String(String),
}

impl ParameterValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{:?}", v),
            ParameterValue::String(s) => f.write_str(s),
        }
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    pub fn log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::log_float(name, low, high))
    }

    pub fn categorical(self, name: impl Into<String>, choices: &[&str]) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Sample a random configuration, drawing parameters in definition order
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// Alias for sampled configuration
pub type TrialParams = BTreeMap<String, ParameterValue>;
