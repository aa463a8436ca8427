//! Модуль, реализующий полносвязный (линейный) слой.

use crate::model::{StateDict, StateError};
use crate::seed::RandomContext;
use ndarray::{Array, Array1, Array2, ArrayD, Dimension};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Полносвязный (линейный) слой: `y = xW + b`.
///
/// Веса хранятся в форме `[in_features, out_features]`, смещения в форме
/// `[out_features]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    /// Тензор весов.
    pub weight: Array2<f32>,
    /// Тензор смещений.
    pub bias: Array1<f32>,
}

impl Linear {
    /// Создает слой со случайными параметрами из `U(-k, k)`, где `k = 1/sqrt(in_features)`.
    ///
    /// # Аргументы
    ///
    /// * `in_features` - Количество входных признаков.
    /// * `out_features` - Количество выходных признаков.
    /// * `rng` - Контекст случайных чисел, из которого берутся начальные значения.
    pub fn new(in_features: usize, out_features: usize, rng: &mut RandomContext) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let dist = Uniform::new(-bound, bound);
        let weight = Array::random_using((in_features, out_features), dist, rng.tensor());
        let bias = Array::random_using(out_features, dist, rng.tensor());
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    /// Прямой проход для батча `[batch, in_features]`.
    ///
    /// Паникует, если число столбцов входа не совпадает с `in_features`.
    pub fn forward(&self, inputs: &Array2<f32>) -> Array2<f32> {
        inputs.dot(&self.weight) + &self.bias
    }

    /// Записывает параметры слоя в `state` под префиксом `prefix`.
    pub fn export(&self, prefix: &str, state: &mut StateDict) {
        state.insert(format!("{}.weight", prefix), self.weight.clone().into_dyn());
        state.insert(format!("{}.bias", prefix), self.bias.clone().into_dyn());
    }

    /// Забирает параметры слоя из `state`.
    ///
    /// Тензоры другой формы отвергаются, параметры слоя при этом не меняются.
    pub fn import(&mut self, prefix: &str, state: &mut StateDict) -> Result<(), StateError> {
        let weight = take(state, &format!("{}.weight", prefix), self.weight.shape())?;
        let bias = take(state, &format!("{}.bias", prefix), self.bias.shape())?;
        self.weight = weight;
        self.bias = bias;
        Ok(())
    }
}

fn take<D: Dimension>(
    state: &mut StateDict,
    name: &str,
    expected: &[usize],
) -> Result<Array<f32, D>, StateError> {
    let tensor: ArrayD<f32> = state
        .remove(name)
        .ok_or_else(|| StateError::MissingParameter(name.to_string()))?;
    let mismatch = || StateError::ShapeMismatch {
        name: name.to_string(),
        expected: expected.to_vec(),
        actual: tensor.shape().to_vec(),
    };
    if tensor.shape() != expected {
        return Err(mismatch());
    }
    let err = mismatch();
    tensor.into_dimensionality::<D>().map_err(|_| err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_init_shapes_and_bounds() {
        let mut rng = RandomContext::new(0);
        let layer = Linear::new(4, 3, &mut rng);
        assert_eq!(layer.in_features(), 4);
        assert_eq!(layer.out_features(), 3);
        assert!(layer.weight.iter().all(|w| w.abs() <= 0.5));
    }

    #[test]
    fn test_forward() {
        let layer = Linear {
            weight: array![[1.0, 0.0], [0.0, 2.0]],
            bias: array![0.5, -1.0],
        };
        let out = layer.forward(&array![[1.0, 1.0], [2.0, 3.0]]);
        assert_eq!(out, array![[1.5, 1.0], [2.5, 5.0]]);
    }

    #[test]
    fn test_export_import() {
        let mut rng = RandomContext::new(5);
        let source = Linear::new(2, 2, &mut rng);
        let mut target = Linear::new(2, 2, &mut rng);
        assert_ne!(source, target);

        let mut state = StateDict::new();
        source.export("fc", &mut state);
        assert!(state.contains_key("fc.weight"));
        target.import("fc", &mut state).unwrap();
        assert_eq!(source, target);
        assert!(state.is_empty());
    }

    #[test]
    fn test_import_rejects_wrong_sizes() {
        let mut rng = RandomContext::new(5);
        let mut layer = Linear::new(2, 2, &mut rng);
        let before = layer.clone();

        let mut state = StateDict::new();
        state.insert("fc.weight".to_string(), ArrayD::zeros(ndarray::IxDyn(&[5, 7])));
        state.insert("fc.bias".to_string(), ArrayD::zeros(ndarray::IxDyn(&[9])));

        let err = layer.import("fc", &mut state).unwrap_err();
        assert_eq!(
            err,
            StateError::ShapeMismatch {
                name: "fc.weight".to_string(),
                expected: vec![2, 2],
                actual: vec![5, 7],
            }
        );
        assert_eq!(layer, before);

        // Годный вес не применяется, если смещение не подошло.
        let mut state = StateDict::new();
        state.insert("fc.weight".to_string(), ArrayD::ones(ndarray::IxDyn(&[2, 2])));
        state.insert("fc.bias".to_string(), ArrayD::zeros(ndarray::IxDyn(&[3])));
        let err = layer.import("fc", &mut state).unwrap_err();
        assert!(matches!(err, StateError::ShapeMismatch { ref name, .. } if name == "fc.bias"));
        assert_eq!(layer, before);
    }
}
