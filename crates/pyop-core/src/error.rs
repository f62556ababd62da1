use thiserror::Error;

use crate::tensor::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("buffer holds {actual} bytes but shape {shape:?} of {dtype} needs {expected}")]
    BufferSize {
        dtype: DataType,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("shape {shape:?} describes {expected} elements but {actual} values were given")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("tensor holds {actual} elements, {requested} requested")]
    TypeMismatch {
        actual: DataType,
        requested: DataType,
    },

    #[error("shape {0:?} overflows the addressable size")]
    Overflow(Vec<usize>),
}
