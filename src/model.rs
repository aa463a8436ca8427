//! Module defining the `Model` trait the checkpoint store saves and restores.

use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use thiserror::Error;

/// Config key holding the activation sub-document.
pub const ACTIVATION_KEY: &str = "act_fn";

/// Ordered JSON mapping with the hyperparameters needed to rebuild a model.
pub type ConfigDocument = serde_json::Map<String, serde_json::Value>;

/// Learned parameters by name.
pub type StateDict = BTreeMap<String, ArrayD<f32>>;

/// Boxed error returned by model constructors.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised when a state dict does not fit the model it is applied to.
#[derive(Error, Debug, PartialEq)]
pub enum StateError {
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("unexpected parameter '{0}'")]
    UnexpectedParameter(String),

    #[error("shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Trait defining what a model exposes to the checkpoint store.
pub trait Model {
    /// Configuration document, including the `act_fn` sub-document.
    fn config(&self) -> ConfigDocument;

    /// Snapshot of all learned parameters.
    fn state_dict(&self) -> StateDict;

    /// Replaces the learned parameters with `state`.
    fn load_state_dict(&mut self, state: StateDict) -> Result<(), StateError>;
}

/// Checks that `state` has exactly the names and shapes of `expected`.
///
/// Helper for `Model::load_state_dict` implementations.
pub fn check_state(expected: &StateDict, state: &StateDict) -> Result<(), StateError> {
    for (name, current) in expected {
        let incoming = state
            .get(name)
            .ok_or_else(|| StateError::MissingParameter(name.clone()))?;
        if incoming.shape() != current.shape() {
            return Err(StateError::ShapeMismatch {
                name: name.clone(),
                expected: current.shape().to_vec(),
                actual: incoming.shape().to_vec(),
            });
        }
    }
    if let Some(extra) = state.keys().find(|k| !expected.contains_key(*k)) {
        return Err(StateError::UnexpectedParameter(extra.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn dict(entries: &[(&str, Vec<usize>)]) -> StateDict {
        entries
            .iter()
            .map(|(n, s)| (n.to_string(), ArrayD::zeros(IxDyn(s))))
            .collect()
    }

    #[test]
    fn test_check_state() {
        let expected = dict(&[("fc.weight", vec![2, 3]), ("fc.bias", vec![3])]);
        assert_eq!(check_state(&expected, &expected.clone()), Ok(()));

        let missing = dict(&[("fc.weight", vec![2, 3])]);
        assert_eq!(
            check_state(&expected, &missing),
            Err(StateError::MissingParameter("fc.bias".to_string()))
        );

        let reshaped = dict(&[("fc.weight", vec![3, 2]), ("fc.bias", vec![3])]);
        assert!(matches!(
            check_state(&expected, &reshaped),
            Err(StateError::ShapeMismatch { ref name, .. }) if name == "fc.weight"
        ));

        let extra = dict(&[("fc.weight", vec![2, 3]), ("fc.bias", vec![3]), ("head.bias", vec![1])]);
        assert_eq!(
            check_state(&expected, &extra),
            Err(StateError::UnexpectedParameter("head.bias".to_string()))
        );
    }
}
