//! Dense float32 tensors and the per-tensor tags that steer conversion.

use crate::errors::{PackError, Result};
use ndarray::{Array, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// An immutable, row-major array of `f32` values with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Wrap `data` with `shape`.
    ///
    /// # Errors
    ///
    /// [`PackError::InvalidShape`] for a rank-0 shape or a zero dimension,
    /// [`PackError::InvalidTensor`] when `data.len()` does not match the
    /// product of the shape.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        if shape.is_empty() {
            return Err(PackError::InvalidShape {
                shape,
                reason: "rank must be at least 1".into(),
            });
        }
        if shape.contains(&0) {
            return Err(PackError::InvalidShape {
                shape,
                reason: "every dimension must be positive".into(),
            });
        }

        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(PackError::InvalidTensor {
                reason: format!(
                    "data has {} elements but shape {:?} requires {}",
                    data.len(),
                    shape,
                    expected
                ),
            });
        }

        Ok(Self { data, shape })
    }

    /// Load a float32 `.npy` array.
    pub fn from_npy(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let array: Array<f32, IxDyn> =
            ndarray_npy::read_npy(path).map_err(|e| PackError::read_failure(path, e))?;

        let shape = array.shape().to_vec();
        // iter() walks logical (row-major) order even for Fortran-ordered files
        let data: Vec<f32> = array.iter().copied().collect();
        Self::new(data, shape)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a constructed tensor; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Swap both dimensions and the physical element order of a rank-2
    /// tensor. Returns `None` for any other rank.
    pub fn transpose_2d(&self) -> Option<Tensor> {
        if self.rank() != 2 {
            return None;
        }

        let (rows, cols) = (self.shape[0], self.shape[1]);
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..cols {
            for r in 0..rows {
                data.push(self.data[r * cols + c]);
            }
        }

        Some(Tensor {
            data,
            shape: vec![cols, rows],
        })
    }
}

/// Role of a tensor in the model, carried alongside it instead of being
/// inferred from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorRole {
    #[default]
    Weight,

    /// Normalization scale parameters; never stored as INT8.
    #[serde(alias = "normalization")]
    Norm,
}

impl TensorRole {
    /// Infer a role from an output file name using the `norm` naming
    /// convention (`layer_3_input_norm.weights`, `output_norm.weights`).
    ///
    /// Only orchestration code that has nothing better than a name should
    /// call this.
    pub fn from_output_name(name: &str) -> Self {
        if name.contains("norm") {
            TensorRole::Norm
        } else {
            TensorRole::Weight
        }
    }
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorRole::Weight => write!(f, "weight"),
            TensorRole::Norm => write!(f, "norm"),
        }
    }
}

impl FromStr for TensorRole {
    type Err = PackError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weight" => Ok(TensorRole::Weight),
            "norm" | "normalization" => Ok(TensorRole::Norm),
            _ => Err(PackError::Config {
                reason: format!("Unknown tensor role: '{}'. Valid roles: weight, norm", s),
            }),
        }
    }
}

/// Storage precision of a serialized tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    #[serde(rename = "int8", alias = "INT8")]
    Int8,
    #[serde(rename = "fp16", alias = "FP16", alias = "float16")]
    Float16,
    #[serde(rename = "fp32", alias = "FP32", alias = "float32")]
    Float32,
}

impl Precision {
    /// Value of the `precisionCode` header field.
    pub fn code(self) -> u32 {
        match self {
            Precision::Int8 => 0,
            Precision::Float16 => 1,
            Precision::Float32 => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Precision::Int8),
            1 => Some(Precision::Float16),
            2 => Some(Precision::Float32),
            _ => None,
        }
    }

    /// Bytes per stored element.
    pub fn element_size(self) -> usize {
        match self {
            Precision::Int8 => 1,
            Precision::Float16 => 2,
            Precision::Float32 => 4,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Int8 => write!(f, "INT8"),
            Precision::Float16 => write!(f, "FP16"),
            Precision::Float32 => write!(f, "FP32"),
        }
    }
}

impl FromStr for Precision {
    type Err = PackError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int8" => Ok(Precision::Int8),
            "fp16" | "float16" => Ok(Precision::Float16),
            "fp32" | "float32" => Ok(Precision::Float32),
            _ => Err(PackError::Config {
                reason: format!("Unknown precision: '{}'. Valid precisions: int8, fp16, fp32", s),
            }),
        }
    }
}
