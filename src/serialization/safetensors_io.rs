// --- Файл: src/serialization/safetensors_io.rs ---

//! Кодек для блоба параметров модели.
//!
//! Блоб хранится в формате SafeTensors: JSON-заголовок с именами, формами и
//! типами тензоров, за которым идут сырые little-endian данные. Формат не
//! исполняет код при загрузке и читается любой библиотекой, понимающей
//! SafeTensors.

use crate::model::StateDict;
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{SafeTensors, TensorView};
use safetensors::{serialize, Dtype};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Ошибки кодирования и декодирования блоба параметров.
#[derive(Error, Debug)]
pub enum TensorIoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SafeTensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error("unsupported dtype {dtype} for tensor '{name}'")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("tensor '{name}' has {len} elements, which does not fit shape {shape:?}")]
    ShapeMismatch {
        name: String,
        shape: Vec<usize>,
        len: usize,
    },
}

type Result<T> = std::result::Result<T, TensorIoError>;

/// Строка сводки по одному тензору блоба.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// Кодирует state dict в байты SafeTensors (все тензоры как F32).
///
/// `metadata` попадает в поле `__metadata__` заголовка.
pub fn encode_state_dict(
    state: &StateDict,
    metadata: &Option<HashMap<String, String>>,
) -> Result<Vec<u8>> {
    // Сначала переводим данные в байты, затем строим TensorView поверх них.
    let data_storage: Vec<(&str, Vec<usize>, Vec<u8>)> = state
        .iter()
        .map(|(name, arr)| {
            let bytes: Vec<u8> = arr.iter().flat_map(|&x| x.to_le_bytes()).collect();
            (name.as_str(), arr.shape().to_vec(), bytes)
        })
        .collect();

    let mut views: Vec<(&str, TensorView<'_>)> = Vec::with_capacity(data_storage.len());
    for (name, shape, bytes) in &data_storage {
        views.push((*name, TensorView::new(Dtype::F32, shape.clone(), bytes)?));
    }

    Ok(serialize(views, metadata)?)
}

/// Декодирует байты SafeTensors в state dict.
///
/// F32 читается как есть, F64 сужается до F32, остальные типы отвергаются.
pub fn decode_state_dict(bytes: &[u8]) -> Result<StateDict> {
    let tensors = SafeTensors::deserialize(bytes)?;
    let mut state = StateDict::new();

    for (name, view) in tensors.tensors() {
        let shape = view.shape().to_vec();
        let values: Vec<f32> = match view.dtype() {
            Dtype::F32 => view
                .data()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Dtype::F64 => view
                .data()
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
                .collect(),
            other => {
                return Err(TensorIoError::UnsupportedDtype {
                    name,
                    dtype: format!("{:?}", other),
                })
            }
        };

        let len = values.len();
        let arr = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| {
            TensorIoError::ShapeMismatch {
                name: name.clone(),
                shape: shape.clone(),
                len,
            }
        })?;
        state.insert(name, arr);
    }

    Ok(state)
}

/// Сохраняет state dict в файл, перезаписывая его.
pub fn save_state_dict<P: AsRef<Path>>(
    path: P,
    state: &StateDict,
    metadata: &Option<HashMap<String, String>>,
) -> Result<()> {
    let bytes = encode_state_dict(state, metadata)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        tensors = state.len(),
        bytes = bytes.len(),
        "writing parameter blob"
    );
    fs::write(path, bytes)?;
    Ok(())
}

/// Загружает state dict из файла.
pub fn load_state_dict<P: AsRef<Path>>(path: P) -> Result<StateDict> {
    let bytes = fs::read(path)?;
    decode_state_dict(&bytes)
}

/// Возвращает информацию о тензорах в файле (имя, форма, тип), по имени.
pub fn tensor_info<P: AsRef<Path>>(path: P) -> Result<Vec<TensorInfo>> {
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)?;

    let mut info: Vec<TensorInfo> = tensors
        .tensors()
        .into_iter()
        .map(|(name, view)| TensorInfo {
            name,
            shape: view.shape().to_vec(),
            dtype: format!("{:?}", view.dtype()),
        })
        .collect();
    info.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(info)
}

/// Читает пользовательские метаданные из заголовка файла.
pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<Option<HashMap<String, String>>> {
    let bytes = fs::read(path)?;
    let (_, header) = SafeTensors::read_metadata(&bytes)?;
    Ok(header.metadata().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> StateDict {
        let mut state = StateDict::new();
        state.insert("test.weight".to_string(), array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn());
        state.insert("test.bias".to_string(), array![0.1f32, 0.2, 0.3].into_dyn());
        state
    }

    #[test]
    fn test_encode_decode() {
        let state = sample();
        let bytes = encode_state_dict(&state, &None).unwrap();
        let decoded = decode_state_dict(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_f64_is_narrowed() {
        let data: Vec<u8> = [1.5f64, -2.0].iter().flat_map(|x| x.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F64, vec![2], &data).unwrap();
        let bytes = serialize(vec![("w", view)], &None).unwrap();

        let decoded = decode_state_dict(&bytes).unwrap();
        assert_eq!(decoded["w"], array![1.5f32, -2.0].into_dyn());
    }

    #[test]
    fn test_rejects_integer_tensors() {
        let data = vec![0u8; 4];
        let view = TensorView::new(Dtype::I32, vec![1], &data).unwrap();
        let bytes = serialize(vec![("ids", view)], &None).unwrap();

        let err = decode_state_dict(&bytes).unwrap_err();
        assert!(matches!(err, TensorIoError::UnsupportedDtype { ref name, .. } if name == "ids"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            decode_state_dict(b"not a blob"),
            Err(TensorIoError::SafeTensors(_))
        ));
    }

    #[test]
    fn test_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.tar");
        let mut meta = HashMap::new();
        meta.insert("format".to_string(), "modelkit".to_string());

        save_state_dict(&path, &sample(), &Some(meta.clone())).unwrap();
        assert_eq!(load_state_dict(&path).unwrap(), sample());
        assert_eq!(read_metadata(&path).unwrap(), Some(meta));

        let info = tensor_info(&path).unwrap();
        assert_eq!(
            info,
            vec![
                TensorInfo {
                    name: "test.bias".to_string(),
                    shape: vec![3],
                    dtype: "F32".to_string(),
                },
                TensorInfo {
                    name: "test.weight".to_string(),
                    shape: vec![2, 3],
                    dtype: "F32".to_string(),
                },
            ]
        );
    }
}
