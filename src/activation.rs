// --- Файл: src/activation.rs ---

//! Activation functions as a closed set of variants, plus the registry that
//! maps a configuration `name` onto a typed constructor.
//!
//! A checkpoint config stores the activation as a sub-document:
//!
//! ```json
//! { "act_fn": { "name": "leakyrelu", "negative_slope": 0.1 } }
//! ```
//!
//! [`ActivationRegistry::build`] lower-cases the name, picks the constructor
//! and parses the remaining fields into that variant's arguments.

use crate::model::ConfigDocument;
use ndarray::{Array, Dimension};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while resolving an activation from its config.
#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("unknown activation function: '{0}'")]
    Unknown(String),

    #[error("invalid arguments for activation '{name}': {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Element-wise activation function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Identity,
    ReLU,
    LeakyReLU { negative_slope: f64 },
    ELU { alpha: f64 },
    Sigmoid,
    Tanh,
    GELU,
    /// Also registered as `swish`.
    SiLU,
    Softplus { beta: f64 },
}

impl Activation {
    /// Canonical registry key of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::ReLU => "relu",
            Activation::LeakyReLU { .. } => "leakyrelu",
            Activation::ELU { .. } => "elu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::GELU => "gelu",
            Activation::SiLU => "silu",
            Activation::Softplus { .. } => "softplus",
        }
    }

    /// The sub-document written under `act_fn`: `name` plus constructor
    /// arguments.
    pub fn to_config(&self) -> ConfigDocument {
        let mut doc = ConfigDocument::new();
        doc.insert("name".to_string(), json!(self.name()));
        match *self {
            Activation::LeakyReLU { negative_slope } => {
                doc.insert("negative_slope".to_string(), json!(negative_slope));
            }
            Activation::ELU { alpha } => {
                doc.insert("alpha".to_string(), json!(alpha));
            }
            Activation::Softplus { beta } => {
                doc.insert("beta".to_string(), json!(beta));
            }
            _ => {}
        }
        doc
    }

    /// Applies the function element-wise.
    pub fn apply<D: Dimension>(&self, x: &Array<f32, D>) -> Array<f32, D> {
        match *self {
            Activation::Identity => x.clone(),
            Activation::ReLU => x.mapv(|v| v.max(0.0)),
            Activation::LeakyReLU { negative_slope } => {
                let slope = negative_slope as f32;
                x.mapv(|v| if v > 0.0 { v } else { slope * v })
            }
            Activation::ELU { alpha } => {
                // ELU(x) = x if x > 0 else alpha * (exp(x) - 1)
                let alpha = alpha as f32;
                x.mapv(|v| if v > 0.0 { v } else { alpha * (v.exp() - 1.0) })
            }
            Activation::Sigmoid => x.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => x.mapv(|v| v.tanh()),
            Activation::GELU => {
                // GELU(x) ≈ 0.5 * x * (1 + tanh(sqrt(2/π) * (x + 0.044715 * x^3)))
                const SQRT_2_OVER_PI: f32 = 0.797_884_6;
                x.mapv(|v| 0.5 * v * (1.0 + (SQRT_2_OVER_PI * (v + 0.044715 * v.powi(3))).tanh()))
            }
            Activation::SiLU => x.mapv(|v| v / (1.0 + (-v).exp())),
            Activation::Softplus { beta } => {
                let beta = beta as f32;
                x.mapv(|v| {
                    let bx = beta * v;
                    if bx > 20.0 {
                        v
                    } else {
                        (1.0 + bx.exp()).ln() / beta
                    }
                })
            }
        }
    }
}

/// Constructor stored in the registry: builds a variant from the fields of
/// the activation sub-document that remain after `name` was taken out.
pub type ActivationCtor = fn(&ConfigDocument) -> Result<Activation, ActivationError>;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LeakyReluArgs {
    #[serde(default = "default_negative_slope")]
    negative_slope: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EluArgs {
    #[serde(default = "default_one")]
    alpha: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SoftplusArgs {
    #[serde(default = "default_one")]
    beta: f64,
}

fn default_negative_slope() -> f64 {
    0.01
}

fn default_one() -> f64 {
    1.0
}

fn parse_args<T: DeserializeOwned>(name: &str, args: &ConfigDocument) -> Result<T, ActivationError> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|source| {
        ActivationError::InvalidArguments {
            name: name.to_string(),
            source,
        }
    })
}

fn unit(name: &str, args: &ConfigDocument, act: Activation) -> Result<Activation, ActivationError> {
    parse_args::<NoArgs>(name, args).map(|_| act)
}

fn identity(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    unit("identity", args, Activation::Identity)
}

fn relu(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    unit("relu", args, Activation::ReLU)
}

fn leaky_relu(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    let a: LeakyReluArgs = parse_args("leakyrelu", args)?;
    Ok(Activation::LeakyReLU {
        negative_slope: a.negative_slope,
    })
}

fn elu(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    let a: EluArgs = parse_args("elu", args)?;
    Ok(Activation::ELU { alpha: a.alpha })
}

fn sigmoid(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    unit("sigmoid", args, Activation::Sigmoid)
}

fn tanh(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    unit("tanh", args, Activation::Tanh)
}

fn gelu(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    unit("gelu", args, Activation::GELU)
}

fn silu(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    unit("silu", args, Activation::SiLU)
}

fn softplus(args: &ConfigDocument) -> Result<Activation, ActivationError> {
    let a: SoftplusArgs = parse_args("softplus", args)?;
    Ok(Activation::Softplus { beta: a.beta })
}

/// Mapping from lower-case identifier to activation constructor.
#[derive(Debug, Clone, Default)]
pub struct ActivationRegistry {
    ctors: HashMap<String, ActivationCtor>,
}

impl ActivationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in variant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register("identity", identity)
            .register("relu", relu)
            .register("leakyrelu", leaky_relu)
            .register("elu", elu)
            .register("sigmoid", sigmoid)
            .register("tanh", tanh)
            .register("gelu", gelu)
            .register("silu", silu)
            .register("swish", silu)
            .register("softplus", softplus);
        registry
    }

    /// Adds or replaces the constructor for `name` (stored lower-cased).
    pub fn register(&mut self, name: &str, ctor: ActivationCtor) -> &mut Self {
        self.ctors.insert(name.to_lowercase(), ctor);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(&name.to_lowercase())
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Looks `name` up case-insensitively and builds the variant from `args`.
    pub fn build(&self, name: &str, args: &ConfigDocument) -> Result<Activation, ActivationError> {
        let key = name.to_lowercase();
        let ctor = self
            .ctors
            .get(&key)
            .ok_or_else(|| ActivationError::Unknown(key.clone()))?;
        ctor(args)
    }
}
