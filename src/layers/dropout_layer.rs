use serde::{Deserialize, Serialize};

use super::{layer_name, NetLayer};

/// Shape-preserving dropout marker. `probability` is the drop rate used
/// during training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropoutLayer {
    name: String,
    probability: f64,
    out_sx: usize,
    out_sy: usize,
    out_depth: usize,
}

impl DropoutLayer {
    pub fn new(block_index: usize, probability: f64, sx: usize, sy: usize, depth: usize) -> Self {
        Self {
            name: layer_name("dropout", block_index),
            probability,
            out_sx: sx,
            out_sy: sy,
            out_depth: depth,
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

#[typetag::serde]
impl NetLayer for DropoutLayer {
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
