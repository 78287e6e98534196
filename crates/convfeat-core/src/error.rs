use thiserror::Error;

/// Core error type for tensor operations.
#[derive(Debug, Error, Clone)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("data length {len} does not match shape {shape:?}")]
    DataLength { len: usize, shape: Vec<usize> },
}

pub type TensorResult<T> = Result<T, TensorError>;
