use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{layer_name, NetLayer};

/// Reshapes the flat output of the last dense layer into the
/// `(side, side, num * 5 + classes)` detection grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionLayer {
    name: String,
    side: usize,
    num: usize,
    classes: usize,
}

impl DetectionLayer {
    /// Fails when `inputs` values cannot be laid out as the grid.
    pub fn new(
        block_index: usize,
        side: usize,
        num: usize,
        classes: usize,
        inputs: usize,
    ) -> Result<Self> {
        let layer = Self {
            name: layer_name("detection", block_index),
            side,
            num,
            classes,
        };
        let expected = side * side * layer.out_depth();
        if expected != inputs {
            return Err(Error::config(
                None,
                format!(
                    "{}: a {side}x{side} grid of {num} boxes and {classes} classes needs {expected} inputs, got {inputs}",
                    layer.name
                ),
            ));
        }
        Ok(layer)
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn boxes_per_cell(&self) -> usize {
        self.num
    }

    pub fn classes(&self) -> usize {
        self.classes
    }
}

#[typetag::serde]
impl NetLayer for DetectionLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn out_depth(&self) -> usize {
        self.num * 5 + self.classes
    }
    fn out_sx(&self) -> usize {
        self.side
    }
    fn out_sy(&self) -> usize {
        self.side
    }
}
