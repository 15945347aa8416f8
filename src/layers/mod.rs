mod batchnorm_layer;
mod conv_layer;
mod detection_layer;
mod dropout_layer;
mod input_layer;
mod pool_layer;

pub use batchnorm_layer::*;
pub use conv_layer::*;
pub use detection_layer::*;
pub use dropout_layer::*;
pub use input_layer::*;
pub use pool_layer::*;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    Tensor,
};

/// A layer in the registry. Layers only describe shapes and hold parameters;
/// executing them is left to whatever consumes the registry.
#[typetag::serde]
pub trait NetLayer {
    /// Stable name, `<kind>_<block index>`.
    fn name(&self) -> &str;

    fn out_sx(&self) -> usize;
    fn out_sy(&self) -> usize;
    fn out_depth(&self) -> usize;

    /// Present for layers whose parameters live in a darknet weight file.
    fn weight_spec(&self) -> Option<LayerWeightSpec> {
        None
    }

    /// Parameters in the same order `set_weights` expects them.
    fn weights(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Replaces kernels with scaled Gaussian noise. Biases and batch-norm
    /// statistics keep their neutral values.
    fn randomize(&mut self) {}

    fn set_weights(&mut self, weights: Vec<Tensor>) -> Result<()> {
        if weights.is_empty() {
            Ok(())
        } else {
            Err(Error::weight_shape(self.name(), "layer has no parameters"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Leaky,
    Linear,
    Relu,
}

impl Activation {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "leaky" => Ok(Self::Leaky),
            "linear" => Ok(Self::Linear),
            "relu" => Ok(Self::Relu),
            other => Err(Error::config(None, format!("unsupported activation `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightKind {
    Convolutional,
    /// Locally connected: one kernel per output location.
    Local { locations: usize },
    /// `filters` is the output count, `input_channels` the flattened input size.
    Connected,
}

impl WeightKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Convolutional => "convolutional",
            Self::Local { .. } => "local",
            Self::Connected => "connected",
        }
    }
}

/// Shape record for one weight-bearing block, emitted when the layer is
/// built so the loader never has to inspect live layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerWeightSpec {
    pub block_index: usize,
    pub kind: WeightKind,
    pub filters: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub input_channels: usize,
    pub has_bias: bool,
    pub has_batchnorm: bool,
}

impl LayerWeightSpec {
    pub fn kernel_values(&self) -> usize {
        let per_location = self.filters * self.input_channels * self.kernel_h * self.kernel_w;
        match self.kind {
            WeightKind::Local { locations } => per_location * locations,
            WeightKind::Convolutional | WeightKind::Connected => per_location,
        }
    }

    /// Number of f32 values this block occupies in a darknet weight file.
    pub fn expected_values(&self) -> usize {
        let n = self.filters;
        match self.kind {
            // biases or batch-norm beta, then gamma/mean/variance, then kernel
            WeightKind::Convolutional => {
                let head = if self.has_batchnorm {
                    4 * n
                } else if self.has_bias {
                    n
                } else {
                    0
                };
                head + self.kernel_values()
            }
            WeightKind::Local { locations } => locations * n + self.kernel_values(),
            // biases, weights, then optional scales/mean/variance
            WeightKind::Connected => {
                let tail = if self.has_batchnorm { 3 * n } else { 0 };
                n + self.kernel_values() + tail
            }
        }
    }

    pub fn expected_bytes(&self) -> u64 {
        self.expected_values() as u64 * 4
    }
}

pub fn layer_name(prefix: &str, block_index: usize) -> String {
    format!("{prefix}_{block_index}")
}

/// Checks that `weights` has exactly the expected tensor shapes, in order.
pub(crate) fn check_shapes(layer: &str, weights: &[Tensor], expected: &[Vec<usize>]) -> Result<()> {
    if weights.len() != expected.len() {
        return Err(Error::weight_shape(
            layer,
            format!("expected {} tensors, got {}", expected.len(), weights.len()),
        ));
    }
    for (i, (tensor, shape)) in weights.iter().zip(expected).enumerate() {
        if tensor.shape() != shape.as_slice() {
            return Err(Error::weight_shape(
                layer,
                format!(
                    "tensor {i} has shape {:?}, expected {:?}",
                    tensor.shape(),
                    shape
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(has_batchnorm: bool) -> LayerWeightSpec {
        LayerWeightSpec {
            block_index: 1,
            kind: WeightKind::Convolutional,
            filters: 2,
            kernel_h: 3,
            kernel_w: 3,
            input_channels: 4,
            has_bias: !has_batchnorm,
            has_batchnorm,
        }
    }

    #[test]
    fn conv_section_sizes() {
        assert_eq!(conv(false).expected_values(), 2 + 2 * 4 * 3 * 3);
        assert_eq!(conv(true).expected_values(), 4 * 2 + 2 * 4 * 3 * 3);
        assert_eq!(conv(true).expected_bytes(), 4 * (8 + 72));
    }

    #[test]
    fn local_and_connected_section_sizes() {
        let local = LayerWeightSpec {
            kind: WeightKind::Local { locations: 49 },
            ..conv(false)
        };
        assert_eq!(local.expected_values(), 49 * 2 + 49 * 72);

        let connected = LayerWeightSpec {
            block_index: 5,
            kind: WeightKind::Connected,
            filters: 10,
            kernel_h: 1,
            kernel_w: 1,
            input_channels: 12,
            has_bias: true,
            has_batchnorm: false,
        };
        assert_eq!(connected.expected_values(), 10 + 120);
        let with_bn = LayerWeightSpec {
            has_batchnorm: true,
            ..connected
        };
        assert_eq!(with_bn.expected_values(), 10 + 120 + 30);
    }

    #[test]
    fn shape_check_reports_mismatch() {
        let weights = vec![Tensor::zeros(&[2, 3])];
        assert!(check_shapes("conv_1", &weights, &[vec![2, 3]]).is_ok());
        assert!(check_shapes("conv_1", &weights, &[vec![3, 2]]).is_err());
        assert!(check_shapes("conv_1", &weights, &[vec![2, 3], vec![3]]).is_err());
    }

    #[test]
    fn activations() {
        assert_eq!(Activation::from_name("leaky").unwrap(), Activation::Leaky);
        assert!(Activation::from_name("mish").is_err());
    }
}
