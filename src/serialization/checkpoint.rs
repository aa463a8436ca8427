// --- Файл: src/serialization/checkpoint.rs ---

//! Сохранение и загрузка чекпоинтов модели.
//!
//! Чекпоинт с именем `name` в директории `dir` состоит из двух файлов:
//!
//! ```text
//! dir/
//! ├── name.config    # JSON-конфиг модели (гиперпараметры + act_fn)
//! └── name.tar       # Параметры модели (SafeTensors)
//! ```
//!
//! Запись не атомарна: если сохранение упало между двумя файлами, чекпоинт
//! остается несогласованным.

use super::safetensors_io::{load_state_dict, save_state_dict, TensorIoError};
use crate::activation::{Activation, ActivationError, ActivationRegistry};
use crate::model::{BoxError, ConfigDocument, Model, StateError, ACTIVATION_KEY};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ошибки при работе с чекпоинтами
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("could not find the config file: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("could not find the model file: {}", .0.display())]
    ModelMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("parameter blob error: {0}")]
    Tensor(#[from] TensorIoError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error("config has no 'act_fn' object with a string 'name'")]
    MissingActivation,

    #[error("activation argument '{argument}' is not a finite number")]
    NonFiniteArgument { argument: String },

    #[error("config and weights share the extension '{0}'")]
    ExtensionClash(String),

    #[error("model construction failed: {0}")]
    Construct(#[source] BoxError),

    #[error("parameters do not fit the model: {0}")]
    State(#[from] StateError),
}

type Result<T> = std::result::Result<T, CheckpointError>;

/// Настройки хранилища чекпоинтов.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointStore {
    /// Расширение файла конфига (без точки).
    pub config_extension: String,
    /// Расширение файла параметров (без точки).
    pub weights_extension: String,
    /// Писать конфиг с отступами.
    pub pretty_json: bool,
    /// Метаданные для заголовка SafeTensors.
    pub metadata: HashMap<String, String>,
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self {
            config_extension: "config".to_string(),
            weights_extension: "tar".to_string(),
            pretty_json: false,
            metadata: HashMap::new(),
        }
    }
}

impl CheckpointStore {
    /// Создает хранилище с настройками по умолчанию.
    pub fn new() -> Self {
        Self::default()
    }

    /// Устанавливает расширение файла конфига.
    pub fn with_config_extension(mut self, ext: &str) -> Self {
        self.config_extension = ext.to_string();
        self
    }

    /// Устанавливает расширение файла параметров.
    ///
    /// Расширение должно отличаться от расширения конфига, иначе `save` и
    /// `load` вернут [`CheckpointError::ExtensionClash`].
    pub fn with_weights_extension(mut self, ext: &str) -> Self {
        self.weights_extension = ext.to_string();
        self
    }

    /// Включает форматированный JSON.
    pub fn with_pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }

    /// Добавляет метаданные в заголовок блоба.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Путь к файлу конфига: `<dir>/<name>.<config_extension>`.
    pub fn config_path<P: AsRef<Path>>(&self, dir: P, name: &str) -> PathBuf {
        dir.as_ref()
            .join(format!("{}.{}", name, self.config_extension))
    }

    /// Путь к файлу параметров: `<dir>/<name>.<weights_extension>`.
    pub fn model_path<P: AsRef<Path>>(&self, dir: P, name: &str) -> PathBuf {
        dir.as_ref()
            .join(format!("{}.{}", name, self.weights_extension))
    }

    /// Сохраняет конфиг и параметры модели, перезаписывая существующие файлы.
    ///
    /// Директория создается вместе с недостающими родителями.
    ///
    /// Конфиг проверяется до записи: аргумент активации, ставший `null`
    /// (NaN или бесконечность), делает чекпоинт незагружаемым.
    pub fn save<M: Model + ?Sized, P: AsRef<Path>>(&self, model: &M, dir: P, name: &str) -> Result<()> {
        self.check_layout()?;
        let config = model.config();
        check_activation_arguments(&config)?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let config_path = self.config_path(dir, name);
        let model_path = self.model_path(dir, name);

        let config = Value::Object(config);
        let json = if self.pretty_json {
            serde_json::to_string_pretty(&config)?
        } else {
            serde_json::to_string(&config)?
        };
        fs::write(&config_path, json)?;

        let state = model.state_dict();
        let metadata = (!self.metadata.is_empty()).then(|| self.metadata.clone());
        save_state_dict(&model_path, &state, &metadata)?;

        tracing::info!(
            dir = %dir.display(),
            name,
            tensors = state.len(),
            "saved checkpoint"
        );
        Ok(())
    }

    /// Загружает модель из чекпоинта.
    ///
    /// Без `existing` модель строится заново: из конфига извлекается
    /// `act_fn`, активация ищется в `registry` без учета регистра, и
    /// `constructor` получает активацию вместе с остальными полями конфига.
    /// С `existing` реестр и конструктор не используются.
    ///
    /// В обоих случаях параметры из блоба перезаписывают параметры модели.
    pub fn load<M, C, E, P>(
        &self,
        dir: P,
        name: &str,
        registry: &ActivationRegistry,
        constructor: C,
        existing: Option<M>,
    ) -> Result<M>
    where
        M: Model,
        C: FnOnce(Activation, ConfigDocument) -> std::result::Result<M, E>,
        E: Into<BoxError>,
        P: AsRef<Path>,
    {
        self.check_layout()?;
        let dir = dir.as_ref();
        let config_path = self.config_path(dir, name);
        let model_path = self.model_path(dir, name);

        if !config_path.is_file() {
            return Err(CheckpointError::ConfigMissing(config_path));
        }
        if !model_path.is_file() {
            return Err(CheckpointError::ModelMissing(model_path));
        }

        let text = fs::read_to_string(&config_path)
            .map_err(|e| missing_or_io(e, CheckpointError::ConfigMissing(config_path.clone())))?;
        let config: ConfigDocument = serde_json::from_str(&text)?;

        let mut model = match existing {
            Some(model) => {
                tracing::debug!(name, "reusing existing model instance");
                model
            }
            None => build_model(config, registry, constructor)?,
        };

        let state = load_state_dict(&model_path).map_err(|e| match e {
            TensorIoError::Io(io) => missing_or_io(io, CheckpointError::ModelMissing(model_path.clone())),
            other => other.into(),
        })?;
        let tensors = state.len();
        model.load_state_dict(state)?;

        tracing::info!(dir = %dir.display(), name, tensors, "loaded checkpoint");
        Ok(model)
    }

    /// Конфиг и параметры должны лежать в разных файлах.
    fn check_layout(&self) -> Result<()> {
        if self.config_extension == self.weights_extension {
            return Err(CheckpointError::ExtensionClash(self.config_extension.clone()));
        }
        Ok(())
    }
}

/// `json!` превращает NaN и бесконечности в `null`.
fn check_activation_arguments(config: &ConfigDocument) -> Result<()> {
    if let Some(Value::Object(act_doc)) = config.get(ACTIVATION_KEY) {
        if let Some((argument, _)) = act_doc.iter().find(|(_, v)| v.is_null()) {
            return Err(CheckpointError::NonFiniteArgument {
                argument: argument.clone(),
            });
        }
    }
    Ok(())
}

/// Файл мог исчезнуть между проверкой и чтением.
fn missing_or_io(err: io::Error, missing: CheckpointError) -> CheckpointError {
    if err.kind() == io::ErrorKind::NotFound {
        missing
    } else {
        CheckpointError::Io(err)
    }
}

fn build_model<M, C, E>(mut config: ConfigDocument, registry: &ActivationRegistry, constructor: C) -> Result<M>
where
    C: FnOnce(Activation, ConfigDocument) -> std::result::Result<M, E>,
    E: Into<BoxError>,
{
    // Поддокумент активации удаляется из конфига, его `name` тоже.
    let mut act_doc = match config.remove(ACTIVATION_KEY) {
        Some(Value::Object(doc)) => doc,
        _ => return Err(CheckpointError::MissingActivation),
    };
    let act_name = match act_doc.remove("name") {
        Some(Value::String(name)) => name,
        _ => return Err(CheckpointError::MissingActivation),
    };

    let activation = registry.build(&act_name, &act_doc)?;
    tracing::debug!(activation = activation.name(), "resolved activation");

    constructor(activation, config).map_err(|e| CheckpointError::Construct(e.into()))
}

/// Путь к файлу конфига с настройками по умолчанию.
pub fn config_path<P: AsRef<Path>>(dir: P, name: &str) -> PathBuf {
    CheckpointStore::default().config_path(dir, name)
}

/// Путь к файлу параметров с настройками по умолчанию.
pub fn model_path<P: AsRef<Path>>(dir: P, name: &str) -> PathBuf {
    CheckpointStore::default().model_path(dir, name)
}

/// Сохраняет модель как `<dir>/<name>.config` + `<dir>/<name>.tar`.
pub fn save_model<M: Model + ?Sized, P: AsRef<Path>>(model: &M, dir: P, name: &str) -> Result<()> {
    CheckpointStore::default().save(model, dir, name)
}

/// Загружает модель, сохраненную [`save_model`].
pub fn load_model<M, C, E, P>(
    dir: P,
    name: &str,
    registry: &ActivationRegistry,
    constructor: C,
    existing: Option<M>,
) -> Result<M>
where
    M: Model,
    C: FnOnce(Activation, ConfigDocument) -> std::result::Result<M, E>,
    E: Into<BoxError>,
    P: AsRef<Path>,
{
    CheckpointStore::default().load(dir, name, registry, constructor, existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StateDict;
    use ndarray::array;
    use serde_json::json;

    /// Простая модель с одним тензором для тестов.
    #[derive(Debug)]
    struct Scalar {
        activation: Activation,
        width: u64,
        value: f32,
    }

    impl Model for Scalar {
        fn config(&self) -> ConfigDocument {
            let mut doc = ConfigDocument::new();
            doc.insert(ACTIVATION_KEY.to_string(), Value::Object(self.activation.to_config()));
            doc.insert("width".to_string(), json!(self.width));
            doc
        }

        fn state_dict(&self) -> StateDict {
            let mut state = StateDict::new();
            state.insert("value".to_string(), array![self.value].into_dyn());
            state
        }

        fn load_state_dict(&mut self, state: StateDict) -> std::result::Result<(), StateError> {
            let value = state
                .get("value")
                .ok_or_else(|| StateError::MissingParameter("value".to_string()))?;
            self.value = value.iter().copied().next().unwrap_or_default();
            Ok(())
        }
    }

    fn scalar_ctor(activation: Activation, config: ConfigDocument) -> std::result::Result<Scalar, BoxError> {
        let width = config
            .get("width")
            .and_then(Value::as_u64)
            .ok_or("missing width")?;
        Ok(Scalar {
            activation,
            width,
            value: 0.0,
        })
    }

    #[test]
    fn test_store_builder_and_paths() {
        let store = CheckpointStore::new()
            .with_config_extension("json")
            .with_weights_extension("safetensors")
            .with_pretty_json(true)
            .with_metadata("epoch", "3");

        assert_eq!(store.config_path("ckpt", "net"), PathBuf::from("ckpt/net.json"));
        assert_eq!(store.model_path("ckpt", "net"), PathBuf::from("ckpt/net.safetensors"));
        assert_eq!(store.metadata.get("epoch"), Some(&"3".to_string()));

        assert_eq!(config_path("a", "b"), PathBuf::from("a/b.config"));
        assert_eq!(model_path("a", "b"), PathBuf::from("a/b.tar"));
    }

    #[test]
    fn test_save_load_scalar() {
        let dir = tempfile::tempdir().unwrap();
        let model = Scalar {
            activation: Activation::ELU { alpha: 0.5 },
            width: 8,
            value: 2.5,
        };
        save_model(&model, dir.path(), "scalar").unwrap();

        let registry = ActivationRegistry::standard();
        let loaded: Scalar = load_model(dir.path(), "scalar", &registry, scalar_ctor, None).unwrap();
        assert_eq!(loaded.activation, model.activation);
        assert_eq!(loaded.width, 8);
        assert_eq!(loaded.value, 2.5);
    }

    #[test]
    fn test_missing_activation_object() {
        let dir = tempfile::tempdir().unwrap();
        let model = Scalar {
            activation: Activation::ReLU,
            width: 1,
            value: 0.0,
        };
        save_model(&model, dir.path(), "m").unwrap();
        fs::write(config_path(dir.path(), "m"), r#"{"width": 1}"#).unwrap();

        let registry = ActivationRegistry::standard();
        let err = load_model(dir.path(), "m", &registry, scalar_ctor, None).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingActivation));

        fs::write(config_path(dir.path(), "m"), r#"{"act_fn": {"alpha": 1.0}, "width": 1}"#).unwrap();
        let err = load_model(dir.path(), "m", &registry, scalar_ctor, None).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingActivation));
    }

    #[test]
    fn test_constructor_error_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let model = Scalar {
            activation: Activation::ReLU,
            width: 1,
            value: 0.0,
        };
        save_model(&model, dir.path(), "m").unwrap();
        fs::write(config_path(dir.path(), "m"), r#"{"act_fn": {"name": "relu"}}"#).unwrap();

        let registry = ActivationRegistry::standard();
        let err = load_model(dir.path(), "m", &registry, scalar_ctor, None).unwrap_err();
        match err {
            CheckpointError::Construct(source) => assert_eq!(source.to_string(), "missing width"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_non_finite_argument_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let model = Scalar {
            activation: Activation::ELU { alpha: f64::INFINITY },
            width: 1,
            value: 0.0,
        };
        let err = save_model(&model, dir.path(), "m").unwrap_err();
        assert!(matches!(err, CheckpointError::NonFiniteArgument { ref argument } if argument == "alpha"));
        assert!(!config_path(dir.path(), "m").exists());
        assert!(!model_path(dir.path(), "m").exists());
    }

    #[test]
    fn test_shared_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new().with_weights_extension("config");
        let model = Scalar {
            activation: Activation::ReLU,
            width: 1,
            value: 0.0,
        };
        let err = store.save(&model, dir.path(), "m").unwrap_err();
        assert!(matches!(err, CheckpointError::ExtensionClash(ref ext) if ext == "config"));
        assert!(!config_path(dir.path(), "m").exists());

        let registry = ActivationRegistry::standard();
        let err = store
            .load(dir.path(), "m", &registry, scalar_ctor, None)
            .unwrap_err();
        assert!(matches!(err, CheckpointError::ExtensionClash(_)));
    }

    #[test]
    fn test_missing_or_io() {
        let missing = missing_or_io(
            io::Error::from(io::ErrorKind::NotFound),
            CheckpointError::ModelMissing(PathBuf::from("x.tar")),
        );
        assert!(matches!(missing, CheckpointError::ModelMissing(_)));

        let denied = missing_or_io(
            io::Error::from(io::ErrorKind::PermissionDenied),
            CheckpointError::ModelMissing(PathBuf::from("x.tar")),
        );
        assert!(matches!(denied, CheckpointError::Io(_)));
    }
}
