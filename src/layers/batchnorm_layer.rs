use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    Tensor,
};

use super::{check_shapes, layer_name, NetLayer};

/// Per-channel normalization following a convolution.
///
/// Parameters are exchanged as `[gamma, beta, running_mean, running_variance]`.
/// Darknet stores them as `[beta, gamma, mean, variance]`; the loader reorders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNormLayer {
    name: String,
    out_sx: usize,
    out_sy: usize,
    channels: usize,

    gamma: Tensor,
    beta: Tensor,
    running_mean: Tensor,
    running_variance: Tensor,
}

impl BatchNormLayer {
    pub fn new(block_index: usize, out_sx: usize, out_sy: usize, channels: usize) -> Self {
        let ones = Tensor::full(&[channels], 1.0);
        Self {
            name: layer_name("batchnorm", block_index),
            out_sx,
            out_sy,
            channels,
            gamma: ones.clone(),
            beta: Tensor::zeros(&[channels]),
            running_mean: Tensor::zeros(&[channels]),
            running_variance: ones,
        }
    }

    pub fn gamma(&self) -> &Tensor {
        &self.gamma
    }

    pub fn beta(&self) -> &Tensor {
        &self.beta
    }

    pub fn running_mean(&self) -> &Tensor {
        &self.running_mean
    }

    pub fn running_variance(&self) -> &Tensor {
        &self.running_variance
    }
}

#[typetag::serde]
impl NetLayer for BatchNormLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn out_depth(&self) -> usize {
        self.channels
    }
    fn out_sx(&self) -> usize {
        self.out_sx
    }
    fn out_sy(&self) -> usize {
        self.out_sy
    }

    fn weights(&self) -> Vec<&Tensor> {
        vec![
            &self.gamma,
            &self.beta,
            &self.running_mean,
            &self.running_variance,
        ]
    }

    fn set_weights(&mut self, weights: Vec<Tensor>) -> Result<()> {
        let shape = vec![self.channels];
        check_shapes(&self.name, &weights, &[shape.clone(), shape.clone(), shape.clone(), shape])?;

        let [gamma, beta, mean, variance] = <[Tensor; 4]>::try_from(weights)
            .map_err(|_| Error::weight_shape(&self.name, "expected 4 tensors"))?;
        self.gamma = gamma;
        self.beta = beta;
        self.running_mean = mean;
        self.running_variance = variance;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> Tensor {
        Tensor::from_shape_vec(&[values.len()], values.to_vec()).unwrap()
    }

    #[test]
    fn starts_as_identity() {
        let layer = BatchNormLayer::new(1, 4, 4, 2);
        assert_eq!(layer.name(), "batchnorm_1");
        assert_eq!(layer.gamma().data(), &[1.0, 1.0]);
        assert_eq!(layer.beta().data(), &[0.0, 0.0]);
        assert_eq!(layer.running_variance().data(), &[1.0, 1.0]);
    }

    #[test]
    fn set_weights_in_gamma_beta_mean_variance_order() {
        let mut layer = BatchNormLayer::new(1, 4, 4, 1);
        layer
            .set_weights(vec![vector(&[2.0]), vector(&[1.0]), vector(&[3.0]), vector(&[4.0])])
            .unwrap();
        assert_eq!(layer.gamma().data(), &[2.0]);
        assert_eq!(layer.beta().data(), &[1.0]);
        assert_eq!(layer.running_mean().data(), &[3.0]);
        assert_eq!(layer.running_variance().data(), &[4.0]);
    }

    #[test]
    fn rejects_wrong_count_or_length() {
        let mut layer = BatchNormLayer::new(1, 4, 4, 2);
        assert!(layer.set_weights(vec![vector(&[1.0, 1.0])]).is_err());
        assert!(layer
            .set_weights(vec![
                vector(&[1.0]),
                vector(&[1.0]),
                vector(&[1.0]),
                vector(&[1.0])
            ])
            .is_err());
    }
}
