// --- Файл: src/serialization/mod.rs ---

//! Модуль для сохранения и загрузки моделей.
//!
//! - **SafeTensors**: формат блоба параметров (`<name>.tar`)
//! - **JSON**: конфиг модели (`<name>.config`)
//! - **Checkpoint**: пара из конфига и параметров под одним именем
//!
//! # Примеры
//!
//! ```rust,ignore
//! use modelkit::serialization::{load_model, save_model};
//!
//! save_model(&net, "checkpoints", "mlp_relu")?;
//! let net: Mlp = load_model("checkpoints", "mlp_relu", &registry, ctor, None)?;
//! ```

pub mod checkpoint;
pub mod safetensors_io;

pub use checkpoint::{config_path, load_model, model_path, save_model, CheckpointError, CheckpointStore};
pub use safetensors_io::{load_state_dict, save_state_dict, tensor_info, TensorInfo, TensorIoError};
