//! Многослойный перцептрон, используемый как эталонная модель для чекпоинтов.

use crate::activation::Activation;
use crate::model::{check_state, ConfigDocument, Model, StateDict, StateError, ACTIVATION_KEY};
use crate::nn::linear::Linear;
use crate::seed::RandomContext;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Гиперпараметры сети (все поля конфига, кроме `act_fn`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MlpConfig {
    /// Размер входного вектора.
    pub input_size: usize,
    /// Число классов (размер выхода).
    pub num_classes: usize,
    /// Размеры скрытых слоев.
    #[serde(default)]
    pub hidden_sizes: Vec<usize>,
}

impl MlpConfig {
    pub fn new(input_size: usize, num_classes: usize) -> Self {
        Self {
            input_size,
            num_classes,
            hidden_sizes: Vec::new(),
        }
    }

    /// Устанавливает размеры скрытых слоев.
    pub fn with_hidden_sizes(mut self, sizes: &[usize]) -> Self {
        self.hidden_sizes = sizes.to_vec();
        self
    }

    /// Разбирает конфиг, из которого уже удален `act_fn`.
    pub fn from_document(doc: ConfigDocument) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(doc))
    }
}

/// Сеть `Linear -> act -> ... -> Linear`.
///
/// Активация применяется после каждого скрытого слоя, но не после выходного.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    config: MlpConfig,
    activation: Activation,
    layers: Vec<Linear>,
}

impl Mlp {
    /// Создает сеть со случайно инициализированными слоями.
    pub fn new(config: MlpConfig, activation: Activation, rng: &mut RandomContext) -> Self {
        let mut sizes = Vec::with_capacity(config.hidden_sizes.len() + 2);
        sizes.push(config.input_size);
        sizes.extend_from_slice(&config.hidden_sizes);
        sizes.push(config.num_classes);

        let layers = sizes
            .windows(2)
            .map(|pair| Linear::new(pair[0], pair[1], rng))
            .collect();

        Self {
            config,
            activation,
            layers,
        }
    }

    /// Конструктор в форме, которую ожидает `load_model`.
    pub fn from_document(
        activation: Activation,
        doc: ConfigDocument,
        rng: &mut RandomContext,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(MlpConfig::from_document(doc)?, activation, rng))
    }

    pub fn hyperparameters(&self) -> &MlpConfig {
        &self.config
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    /// Прямой проход для батча `[batch, input_size]`.
    pub fn forward(&self, inputs: &Array2<f32>) -> Array2<f32> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = inputs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x);
            if i < last {
                x = self.activation.apply(&x);
            }
        }
        x
    }

    fn layer_name(index: usize) -> String {
        format!("layers.{}", index)
    }
}

impl Model for Mlp {
    fn config(&self) -> ConfigDocument {
        let mut doc = ConfigDocument::new();
        doc.insert(
            ACTIVATION_KEY.to_string(),
            Value::Object(self.activation.to_config()),
        );
        doc.insert("input_size".to_string(), json!(self.config.input_size));
        doc.insert("num_classes".to_string(), json!(self.config.num_classes));
        doc.insert("hidden_sizes".to_string(), json!(self.config.hidden_sizes));
        doc
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, layer) in self.layers.iter().enumerate() {
            layer.export(&Self::layer_name(i), &mut state);
        }
        state
    }

    fn load_state_dict(&mut self, mut state: StateDict) -> Result<(), StateError> {
        check_state(&self.state_dict(), &state)?;
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.import(&Self::layer_name(i), &mut state)?;
        }
        Ok(())
    }
}
