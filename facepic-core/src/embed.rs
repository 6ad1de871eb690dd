use ndarray::Array1;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Empty embedding")]
    Empty,
    #[error("Invalid embedding dimension, expected {expected} but got {got}")]
    InvalidDimension { expected: usize, got: usize },
    #[error("Embedding component {index} is not finite")]
    NonFinite { index: usize },
}

/// Dimension of ArcFace-family embeddings (InsightFace buffalo models)
pub const ARCFACE_DIM: usize = 512;

/// Dimension of dlib / face-api.js embeddings
pub const DLIB_DIM: usize = 128;

/// Face embedding of a fixed, validated dimensionality.
///
/// Construct through [`Embedding::new`], which checks the vector against the
/// dimension the configured detector produces. Two embeddings of different
/// dimensionality never meet inside the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Array1<f32>);

impl Embedding {
    /// Validate raw detector output against the expected dimension
    pub fn new(values: Vec<f32>, dimension: usize) -> Result<Self, EmbedError> {
        if values.is_empty() {
            return Err(EmbedError::Empty);
        }
        if values.len() != dimension {
            return Err(EmbedError::InvalidDimension {
                expected: dimension,
                got: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbedError::NonFinite { index });
        }

        Ok(Self(Array1::from_vec(values)))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_array(&self) -> &Array1<f32> {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.0.to_vec()
    }

    /// Euclidean length of the vector, computed in f64
    pub fn norm(&self) -> f64 {
        norm(&self.0)
    }

    /// L2-normalized copy; a zero vector stays zero
    pub fn normalized(&self) -> Self {
        Self(normalize(self.0.clone()))
    }
}

fn norm(values: &Array1<f32>) -> f64 {
    values
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt()
}

fn normalize(mut values: Array1<f32>) -> Array1<f32> {
    let norm = norm(&values);
    if norm > 0.0 {
        values.mapv_inplace(|v| (f64::from(v) / norm) as f32);
    }
    values
}
