//! This file contains all layers that do dot products with input,
//! but usually in a different connectivity pattern and weight sharing
//! schemes:
//! - ConvLayer does convolutions (so weight sharing spatially)
//! - LocalLayer is a convolution without weight sharing, one kernel per output position
//! - FullyConnLayer is fully connected dot products
//! putting them together in one file because they are very similar

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    Tensor,
};

use super::{check_shapes, layer_name, Activation, LayerWeightSpec, NetLayer, WeightKind};

/// Output size of a strided window. `None` when the kernel does not fit
/// into the padded input or the stride is zero.
pub fn window_out(input: usize, padding: usize, kernel: usize, stride: usize) -> Option<usize> {
    let padded = input + padding * 2;
    if stride == 0 || kernel == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

fn geometry_error(name: &str, input: usize, padding: usize, kernel: usize, stride: usize) -> Error {
    Error::config(
        None,
        format!("{name}: kernel {kernel} with stride {stride} does not fit input {input} padded by {padding}"),
    )
}

/// Convolution with a `(kernel_h, kernel_w, in_depth, filters)` kernel and an
/// optional per-filter bias. Layers followed by batch normalization have no bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvLayer {
    name: String,
    block_index: usize,

    out_depth: usize,
    sx: usize,
    sy: usize,

    in_depth: usize,
    in_sx: usize,
    in_sy: usize,

    stride: usize,
    padding: usize,
    activation: Activation,
    batch_normalize: bool,

    out_sx: usize,
    out_sy: usize,

    kernel: Tensor,
    bias: Option<Tensor>,
}

impl ConvLayer {
    pub fn builder(
        block_index: usize,
        filters: usize,
        sx: usize,
        in_depth: usize,
        in_sx: usize,
        in_sy: usize,
    ) -> ConvLayerBuilder {
        ConvLayerBuilder::new(block_index, filters, sx, in_depth, in_sx, in_sy)
    }

    pub fn kernel(&self) -> &Tensor {
        &self.kernel
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn batch_normalize(&self) -> bool {
        self.batch_normalize
    }

    fn kernel_shape(&self) -> Vec<usize> {
        vec![self.sy, self.sx, self.in_depth, self.out_depth]
    }
}

pub struct ConvLayerBuilder {
    block_index: usize,
    out_depth: usize,
    sx: usize,

    in_depth: usize,
    in_sx: usize,
    in_sy: usize,

    sy: usize,
    stride: usize,
    padding: usize,
    activation: Activation,
    batch_normalize: bool,
}

impl ConvLayerBuilder {
    pub fn new(
        block_index: usize,
        filters: usize,
        sx: usize,
        in_depth: usize,
        in_sx: usize,
        in_sy: usize,
    ) -> Self {
        Self {
            // required
            block_index,
            out_depth: filters,
            sx,
            in_depth,
            in_sx,
            in_sy,

            // optional
            sy: sx,
            stride: 1,
            padding: 0,
            activation: Activation::Linear,
            batch_normalize: false,
        }
    }

    /// stride at which we apply filters to input volume
    ///
    /// default: 1
    pub fn stride(mut self, value: usize) -> Self {
        self.stride = value;
        self
    }

    /// padding to add around borders of input volume
    ///
    /// default: 0
    pub fn padding(mut self, value: usize) -> Self {
        self.padding = value;
        self
    }

    /// default: linear
    pub fn activation(mut self, value: Activation) -> Self {
        self.activation = value;
        self
    }

    /// A batch-normalized convolution carries no bias of its own.
    ///
    /// default: false
    pub fn batch_normalize(mut self, value: bool) -> Self {
        self.batch_normalize = value;
        self
    }

    pub fn build(self) -> Result<ConvLayer> {
        let name = layer_name("conv", self.block_index);
        // note we are doing floor, so if the strided convolution of the filter doesnt fit into the input
        // volume exactly, the output volume will be trimmed and not contain the (incomplete) computed
        // final application.
        let out_sx = window_out(self.in_sx, self.padding, self.sx, self.stride)
            .ok_or_else(|| geometry_error(&name, self.in_sx, self.padding, self.sx, self.stride))?;
        let out_sy = window_out(self.in_sy, self.padding, self.sy, self.stride)
            .ok_or_else(|| geometry_error(&name, self.in_sy, self.padding, self.sy, self.stride))?;

        let kernel = Tensor::zeros(&[self.sy, self.sx, self.in_depth, self.out_depth]);
        let bias = (!self.batch_normalize).then(|| Tensor::zeros(&[self.out_depth]));

        Ok(ConvLayer {
            name,
            block_index: self.block_index,
            out_depth: self.out_depth,
            sx: self.sx,
            sy: self.sy,
            in_depth: self.in_depth,
            in_sx: self.in_sx,
            in_sy: self.in_sy,
            stride: self.stride,
            padding: self.padding,
            activation: self.activation,
            batch_normalize: self.batch_normalize,
            out_sx,
            out_sy,
            kernel,
            bias,
        })
    }
}

#[typetag::serde]
impl NetLayer for ConvLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn out_depth(&self) -> usize {
        self.out_depth
    }
    fn out_sx(&self) -> usize {
        self.out_sx
    }
    fn out_sy(&self) -> usize {
        self.out_sy
    }

    fn weight_spec(&self) -> Option<LayerWeightSpec> {
        Some(LayerWeightSpec {
            block_index: self.block_index,
            kind: WeightKind::Convolutional,
            filters: self.out_depth,
            kernel_h: self.sy,
            kernel_w: self.sx,
            input_channels: self.in_depth,
            has_bias: self.bias.is_some(),
            has_batchnorm: self.batch_normalize,
        })
    }

    fn randomize(&mut self) {
        self.kernel.fill_random(self.sx * self.sy * self.in_depth);
    }

    fn weights(&self) -> Vec<&Tensor> {
        let mut result = vec![&self.kernel];
        result.extend(self.bias.as_ref());
        result
    }

    /// `[kernel]` without bias, `[kernel, bias]` with.
    fn set_weights(&mut self, weights: Vec<Tensor>) -> Result<()> {
        let mut expected = vec![self.kernel_shape()];
        if self.bias.is_some() {
            expected.push(vec![self.out_depth]);
        }
        check_shapes(&self.name, &weights, &expected)?;

        let mut weights = weights.into_iter();
        if let Some(kernel) = weights.next() {
            self.kernel = kernel;
        }
        if let Some(bias) = weights.next() {
            self.bias = Some(bias);
        }
        Ok(())
    }
}

/// Locally connected layer. The kernel has shape
/// `(locations, kernel_h * kernel_w * in_depth, filters)` and the bias
/// `(out_sy, out_sx, filters)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalLayer {
    name: String,
    block_index: usize,

    out_depth: usize,
    sx: usize,
    in_depth: usize,

    stride: usize,
    padding: usize,
    activation: Activation,

    out_sx: usize,
    out_sy: usize,

    kernel: Tensor,
    bias: Tensor,
}

impl LocalLayer {
    pub fn builder(
        block_index: usize,
        filters: usize,
        sx: usize,
        in_depth: usize,
        in_sx: usize,
        in_sy: usize,
    ) -> LocalLayerBuilder {
        LocalLayerBuilder {
            block_index,
            out_depth: filters,
            sx,
            in_depth,
            in_sx,
            in_sy,
            stride: 1,
            padding: 0,
            activation: Activation::Linear,
        }
    }

    pub fn locations(&self) -> usize {
        self.out_sx * self.out_sy
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn shapes(&self) -> Vec<Vec<usize>> {
        vec![
            vec![
                self.locations(),
                self.sx * self.sx * self.in_depth,
                self.out_depth,
            ],
            vec![self.out_sy, self.out_sx, self.out_depth],
        ]
    }
}

pub struct LocalLayerBuilder {
    block_index: usize,
    out_depth: usize,
    sx: usize,
    in_depth: usize,
    in_sx: usize,
    in_sy: usize,

    stride: usize,
    padding: usize,
    activation: Activation,
}

impl LocalLayerBuilder {
    /// default: 1
    pub fn stride(mut self, value: usize) -> Self {
        self.stride = value;
        self
    }

    /// default: 0
    pub fn padding(mut self, value: usize) -> Self {
        self.padding = value;
        self
    }

    /// default: linear
    pub fn activation(mut self, value: Activation) -> Self {
        self.activation = value;
        self
    }

    pub fn build(self) -> Result<LocalLayer> {
        let name = layer_name("local", self.block_index);
        let out_sx = window_out(self.in_sx, self.padding, self.sx, self.stride)
            .ok_or_else(|| geometry_error(&name, self.in_sx, self.padding, self.sx, self.stride))?;
        let out_sy = window_out(self.in_sy, self.padding, self.sx, self.stride)
            .ok_or_else(|| geometry_error(&name, self.in_sy, self.padding, self.sx, self.stride))?;

        let fan_in = self.sx * self.sx * self.in_depth;
        Ok(LocalLayer {
            name,
            block_index: self.block_index,
            out_depth: self.out_depth,
            sx: self.sx,
            in_depth: self.in_depth,
            stride: self.stride,
            padding: self.padding,
            activation: self.activation,
            out_sx,
            out_sy,
            kernel: Tensor::zeros(&[out_sx * out_sy, fan_in, self.out_depth]),
            bias: Tensor::zeros(&[out_sy, out_sx, self.out_depth]),
        })
    }
}

#[typetag::serde]
impl NetLayer for LocalLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn out_depth(&self) -> usize {
        self.out_depth
    }
    fn out_sx(&self) -> usize {
        self.out_sx
    }
    fn out_sy(&self) -> usize {
        self.out_sy
    }

    fn weight_spec(&self) -> Option<LayerWeightSpec> {
        Some(LayerWeightSpec {
            block_index: self.block_index,
            kind: WeightKind::Local {
                locations: self.locations(),
            },
            filters: self.out_depth,
            kernel_h: self.sx,
            kernel_w: self.sx,
            input_channels: self.in_depth,
            has_bias: true,
            has_batchnorm: false,
        })
    }

    fn randomize(&mut self) {
        self.kernel.fill_random(self.sx * self.sx * self.in_depth);
    }

    fn weights(&self) -> Vec<&Tensor> {
        vec![&self.kernel, &self.bias]
    }

    fn set_weights(&mut self, weights: Vec<Tensor>) -> Result<()> {
        check_shapes(&self.name, &weights, &self.shapes())?;
        let mut weights = weights.into_iter();
        if let (Some(kernel), Some(bias)) = (weights.next(), weights.next()) {
            self.kernel = kernel;
            self.bias = bias;
        }
        Ok(())
    }
}

/// Dense layer over the flattened input, kernel `(num_inputs, out_depth)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullyConnLayer {
    name: String,
    block_index: usize,

    // required
    out_depth: usize,

    // optional
    activation: Activation,
    batch_normalize: bool,

    // computed
    num_inputs: usize,

    kernel: Tensor,
    bias: Tensor,
}

impl FullyConnLayer {
    pub fn builder(
        block_index: usize,
        num_neurons: usize,
        in_sx: usize,
        in_sy: usize,
        in_depth: usize,
    ) -> FullyConnLayerBuilder {
        FullyConnLayerBuilder::new(block_index, num_neurons, in_sx, in_sy, in_depth)
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

#[typetag::serde]
impl NetLayer for FullyConnLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn out_sx(&self) -> usize {
        1
    }

    fn out_depth(&self) -> usize {
        self.out_depth
    }

    fn out_sy(&self) -> usize {
        1
    }

    fn weight_spec(&self) -> Option<LayerWeightSpec> {
        Some(LayerWeightSpec {
            block_index: self.block_index,
            kind: WeightKind::Connected,
            filters: self.out_depth,
            kernel_h: 1,
            kernel_w: 1,
            input_channels: self.num_inputs,
            has_bias: true,
            has_batchnorm: self.batch_normalize,
        })
    }

    fn randomize(&mut self) {
        self.kernel.fill_random(self.num_inputs);
    }

    fn weights(&self) -> Vec<&Tensor> {
        vec![&self.kernel, &self.bias]
    }

    fn set_weights(&mut self, weights: Vec<Tensor>) -> Result<()> {
        let expected = [vec![self.num_inputs, self.out_depth], vec![self.out_depth]];
        check_shapes(&self.name, &weights, &expected)?;
        let mut weights = weights.into_iter();
        if let (Some(kernel), Some(bias)) = (weights.next(), weights.next()) {
            self.kernel = kernel;
            self.bias = bias;
        }
        Ok(())
    }
}

pub struct FullyConnLayerBuilder {
    block_index: usize,

    // required
    out_depth: usize,

    // optional
    activation: Activation,
    batch_normalize: bool,

    in_sx: usize,
    in_sy: usize,
    in_depth: usize,
}

impl FullyConnLayerBuilder {
    fn new(
        block_index: usize,
        num_neurons: usize,
        in_sx: usize,
        in_sy: usize,
        in_depth: usize,
    ) -> Self {
        Self {
            block_index,
            // required
            out_depth: num_neurons,

            activation: Activation::Linear,
            batch_normalize: false,

            in_sx,
            in_sy,
            in_depth,
        }
    }

    /// default: linear
    pub fn activation(mut self, value: Activation) -> Self {
        self.activation = value;
        self
    }

    /// default: false
    pub fn batch_normalize(mut self, value: bool) -> Self {
        self.batch_normalize = value;
        self
    }

    pub fn build(self) -> FullyConnLayer {
        let num_inputs = self.in_sx * self.in_sy * self.in_depth;

        FullyConnLayer {
            name: layer_name("connected", self.block_index),
            block_index: self.block_index,
            out_depth: self.out_depth,

            activation: self.activation,
            batch_normalize: self.batch_normalize,

            // computed
            num_inputs,
            kernel: Tensor::zeros(&[num_inputs, self.out_depth]),
            bias: Tensor::zeros(&[self.out_depth]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_arithmetic() {
        assert_eq!(window_out(448, 3, 7, 2), Some(224));
        assert_eq!(window_out(7, 1, 3, 1), Some(7));
        assert_eq!(window_out(14, 1, 3, 2), Some(7));
        assert_eq!(window_out(2, 0, 3, 1), None);
        assert_eq!(window_out(4, 0, 2, 0), None);
    }

    #[test]
    fn conv_output_and_spec() {
        let layer = ConvLayer::builder(3, 8, 3, 4, 10, 10)
            .padding(1)
            .stride(2)
            .batch_normalize(true)
            .build()
            .unwrap();
        assert_eq!(layer.name(), "conv_3");
        assert_eq!((layer.stride(), layer.padding()), (2, 1));
        assert_eq!((layer.out_sx(), layer.out_sy(), layer.out_depth()), (5, 5, 8));
        assert!(layer.bias().is_none());
        assert_eq!(layer.kernel().shape(), &[3, 3, 4, 8]);

        let spec = layer.weight_spec().unwrap();
        assert_eq!(spec.kind, WeightKind::Convolutional);
        assert_eq!(spec.input_channels, 4);
        assert!(spec.has_batchnorm && !spec.has_bias);
    }

    #[test]
    fn randomize_only_touches_the_kernel() {
        let mut layer = ConvLayer::builder(1, 4, 3, 2, 5, 5).build().unwrap();
        layer.randomize();
        assert!(layer.kernel().data().iter().any(|v| *v != 0.0));
        assert!(layer.bias().unwrap().data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn conv_rejects_kernel_larger_than_input() {
        assert!(ConvLayer::builder(1, 2, 5, 1, 3, 3).build().is_err());
    }

    #[test]
    fn conv_set_weights_checks_shapes() {
        let mut layer = ConvLayer::builder(1, 2, 1, 3, 4, 4).build().unwrap();
        let kernel = Tensor::zeros(&[1, 1, 3, 2]);
        let bias = Tensor::from_shape_vec(&[2], vec![0.5, -0.5]).unwrap();

        // bias is required when there is no batch norm
        assert!(layer.set_weights(vec![kernel.clone()]).is_err());
        assert!(layer
            .set_weights(vec![Tensor::zeros(&[2, 3, 1, 1]), bias.clone()])
            .is_err());

        layer.set_weights(vec![kernel, bias]).unwrap();
        assert_eq!(layer.bias().unwrap().data(), &[0.5, -0.5]);
        assert!(layer.kernel().data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn local_layer_shapes() {
        let layer = LocalLayer::builder(30, 4, 3, 8, 7, 7)
            .padding(1)
            .build()
            .unwrap();
        assert_eq!(layer.locations(), 49);
        let spec = layer.weight_spec().unwrap();
        assert_eq!(spec.kind, WeightKind::Local { locations: 49 });
        assert_eq!(spec.expected_values(), 49 * 4 + 49 * 4 * 8 * 9);
        assert_eq!(layer.weights()[0].shape(), &[49, 9 * 8, 4]);
        assert_eq!(layer.weights()[1].shape(), &[7, 7, 4]);
    }

    #[test]
    fn connected_flattens_input() {
        let layer = FullyConnLayer::builder(32, 35, 7, 7, 4).build();
        assert_eq!(layer.num_inputs(), 196);
        assert_eq!((layer.out_sx(), layer.out_sy(), layer.out_depth()), (1, 1, 35));
        assert_eq!(layer.weight_spec().unwrap().kind, WeightKind::Connected);
    }
}
