use serde::{Deserialize, Serialize};

use super::NetLayer;

/// Image geometry taken from the `[net]` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLayer {
    channels: usize,
    width: usize,
    height: usize,
}

impl InputLayer {
    pub fn with_dimensions(channels: usize, width: usize, height: usize) -> Self {
        Self {
            channels,
            width,
            height,
        }
    }
}

#[typetag::serde]
impl NetLayer for InputLayer {
    fn name(&self) -> &str {
        "input_0"
    }

    fn out_depth(&self) -> usize {
        self.channels
    }
    fn out_sx(&self) -> usize {
        self.width
    }
    fn out_sy(&self) -> usize {
        self.height
    }
}
