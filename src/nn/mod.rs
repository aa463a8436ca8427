//! # Neural Network Layers Module
//!
//! Concrete layers whose parameters live in `ndarray` arrays, so that they
//! can be exported to and restored from a [`StateDict`](crate::model::StateDict).
//!
//! - [`Linear`]: fully connected layer
//! - [`Mlp`]: stack of `Linear` layers with an [`Activation`](crate::activation::Activation) between them

pub mod linear;
pub mod mlp;

pub use linear::Linear;
pub use mlp::{Mlp, MlpConfig};
