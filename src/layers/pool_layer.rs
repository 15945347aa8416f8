use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{layer_name, window_out, NetLayer};

/// Max pooling over `sx * sy` windows without padding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolLayer {
    name: String,

    // required
    sx: usize,
    in_depth: usize,
    in_sx: usize,
    in_sy: usize,

    // optional
    sy: usize,
    stride: usize,
    padding: usize,

    // computed
    out_depth: usize,
    out_sx: usize,
    out_sy: usize,
}

impl PoolLayer {
    pub fn builder(
        block_index: usize,
        sx: usize,
        in_depth: usize,
        in_sx: usize,
        in_sy: usize,
    ) -> PoolLayerBuilder {
        PoolLayerBuilder::new(block_index, sx, in_depth, in_sx, in_sy)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

pub struct PoolLayerBuilder {
    block_index: usize,

    // required
    sx: usize,
    in_depth: usize,
    in_sx: usize,
    in_sy: usize,

    // optional
    sy: usize,
    stride: usize,
    padding: usize,
}

impl PoolLayerBuilder {
    fn new(
        block_index: usize,
        // required
        sx: usize,
        in_depth: usize,
        in_sx: usize,
        in_sy: usize,
    ) -> Self {
        Self {
            block_index,
            sx,
            in_depth,
            in_sx,
            in_sy,

            sy: sx,
            stride: 2,
            padding: 0,
        }
    }

    /// default: 2
    pub fn stride(mut self, value: usize) -> Self {
        self.stride = value;
        self
    }

    pub fn build(self) -> Result<PoolLayer> {
        let name = layer_name("maxpool", self.block_index);
        let fit = |input: usize, window: usize| {
            window_out(input, self.padding, window, self.stride).ok_or_else(|| {
                Error::config(
                    None,
                    format!(
                        "{name}: window {window} with stride {} does not fit input {input}",
                        self.stride
                    ),
                )
            })
        };
        let out_sx = fit(self.in_sx, self.sx)?;
        let out_sy = fit(self.in_sy, self.sy)?;

        Ok(PoolLayer {
            name,
            sx: self.sx,
            in_depth: self.in_depth,
            in_sx: self.in_sx,
            in_sy: self.in_sy,
            sy: self.sy,
            stride: self.stride,
            padding: self.padding,

            out_depth: self.in_depth,
            out_sx,
            out_sy,
        })
    }
}

#[typetag::serde]
impl NetLayer for PoolLayer {
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
}
