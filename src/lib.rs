//! # modelkit: reproducible runs and model checkpoints
//!
//! Small helpers for ML experiments built on `ndarray`:
//!
//! - [`seed::RandomContext`] seeds every random source of a run from one integer;
//! - [`serialization`] saves a model as `<name>.config` (JSON) plus
//!   `<name>.tar` (SafeTensors) and rebuilds it on load;
//! - [`activation`] and [`nn`] provide the activation registry and a
//!   reference network to checkpoint.
//!
//! ## Usage Example
//!
//! ```no_run
//! use modelkit::activation::{Activation, ActivationRegistry};
//! use modelkit::nn::{Mlp, MlpConfig};
//! use modelkit::seed::RandomContext;
//! use modelkit::serialization::{load_model, save_model};
//!
//! let mut rng = RandomContext::new(42);
//! let net = Mlp::new(MlpConfig::new(784, 10).with_hidden_sizes(&[256, 128]), Activation::ReLU, &mut rng);
//! save_model(&net, "saved_models", "mlp_relu").unwrap();
//!
//! let registry = ActivationRegistry::standard();
//! let restored: Mlp = load_model(
//!     "saved_models",
//!     "mlp_relu",
//!     &registry,
//!     |act, cfg| Mlp::from_document(act, cfg, &mut rng),
//!     None,
//! )
//! .unwrap();
//! assert_eq!(restored, net);
//! ```

// Declare public modules that constitute the library API.
pub mod activation;
pub mod model;
pub mod nn;
pub mod seed;
pub mod serialization;
