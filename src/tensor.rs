use serde::{Deserialize, Serialize};

use crate::{utils::randn, Float};

/// Dense row-major n-dimensional array. Used for layer parameters whose
/// rank is not fixed (kernels are 4D, biases and batch-norm vectors are 1D).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorParts")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<Float>,
}

#[derive(Deserialize)]
struct TensorParts {
    shape: Vec<usize>,
    data: Vec<Float>,
}

impl TryFrom<TensorParts> for Tensor {
    type Error = String;

    fn try_from(parts: TensorParts) -> Result<Self, Self::Error> {
        let len = parts.data.len();
        Tensor::from_shape_vec(&parts.shape, parts.data)
            .ok_or_else(|| format!("tensor of shape {:?} cannot hold {len} values", parts.shape))
    }
}

impl Tensor {
    /// Returns `None` when `data` does not hold exactly `product(shape)` values.
    pub fn from_shape_vec(shape: &[usize], data: Vec<Float>) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn full(shape: &[usize], value: Float) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    // weight normalization is done to equalize the output
    // variance of every neuron, otherwise neurons with a lot
    // of incoming connections have outputs of larger variance
    pub fn fill_random(&mut self, fan_in: usize) {
        let scale = (1.0 / fan_in.max(1) as Float).sqrt();
        for w in &mut self.data {
            *w = randn(0.0, scale);
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[Float] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    fn offset(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.shape.len());
        Self::strides(&self.shape)
            .iter()
            .zip(index)
            .map(|(s, i)| s * i)
            .sum()
    }

    pub fn get(&self, index: &[usize]) -> Float {
        self.data[self.offset(index)]
    }

    /// Permutes axes: output axis `k` is input axis `axes[k]`, so the
    /// result has shape `[shape[axes[0]], shape[axes[1]], ...]`.
    ///
    /// # Panics
    /// If `axes` is not a permutation of `0..rank`.
    pub fn transpose(&self, axes: &[usize]) -> Self {
        let rank = self.shape.len();
        assert_eq!(axes.len(), rank, "axes must name every dimension");
        let mut seen = vec![false; rank];
        for &a in axes {
            assert!(a < rank && !seen[a], "axes must be a permutation");
            seen[a] = true;
        }

        let in_strides = Self::strides(&self.shape);
        let out_shape: Vec<usize> = axes.iter().map(|&a| self.shape[a]).collect();
        // stride in the source buffer for each output axis
        let walk: Vec<usize> = axes.iter().map(|&a| in_strides[a]).collect();

        let mut data = Vec::with_capacity(self.data.len());
        let mut counter = vec![0usize; rank];
        let mut src = 0usize;
        for _ in 0..self.data.len() {
            data.push(self.data[src]);
            // odometer increment over the output index, last axis fastest
            for k in (0..rank).rev() {
                counter[k] += 1;
                src += walk[k];
                if counter[k] < out_shape[k] {
                    break;
                }
                src -= walk[k] * counter[k];
                counter[k] = 0;
            }
        }

        Self {
            shape: out_shape,
            data,
        }
    }
}
