use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    cfg::{BlockKind, ConfigBlock, NetworkSpec},
    error::{Error, Result},
    layers::{
        Activation, BatchNormLayer, ConvLayer, DetectionLayer, DropoutLayer, FullyConnLayer,
        InputLayer, LayerWeightSpec, LocalLayer, NetLayer, PoolLayer,
    },
    Tensor,
};

/// Access to instantiated layers, as seen by the weight loader.
pub trait LayerRegistry {
    /// One record per weight-bearing block, in block order.
    fn weight_specs(&self) -> &[LayerWeightSpec];

    fn layer(&self, name: &str) -> Option<&dyn NetLayer>;

    /// Replaces the parameters of the named layer.
    fn set_weights(&mut self, name: &str, weights: Vec<Tensor>) -> Result<()>;
}

// Net manages a set of layers
// Layers are kept in block order; a convolution with batch norm
// contributes two layers (`conv_<i>` then `batchnorm_<i>`).
#[derive(Serialize, Deserialize)]
#[serde(from = "NetParts")]
pub struct Net {
    layers: Vec<Box<dyn NetLayer>>,

    #[serde(skip)]
    weight_specs: Vec<LayerWeightSpec>,
}

// Weight specs are derived from the layers, so only the layers are stored.
#[derive(Deserialize)]
struct NetParts {
    layers: Vec<Box<dyn NetLayer>>,
}

impl From<NetParts> for Net {
    fn from(parts: NetParts) -> Self {
        Self::from_layers(parts.layers)
    }
}

impl std::fmt::Debug for Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Net")
            .field("layers", &self.layers.iter().map(|l| l.name()).collect::<Vec<_>>())
            .field("weight_specs", &self.weight_specs)
            .finish()
    }
}

#[derive(Clone, Copy)]
struct Dim {
    in_sx: usize,
    in_sy: usize,
    in_depth: usize,
}

impl Dim {
    fn of(layer: &dyn NetLayer) -> Self {
        Self {
            in_sx: layer.out_sx(),
            in_sy: layer.out_sy(),
            in_depth: layer.out_depth(),
        }
    }
}

/// Padding for conv-like blocks: an explicit `padding` wins, otherwise
/// `pad=1` means "same" padding for odd kernels.
fn block_padding(block: &ConfigBlock, size: usize) -> Result<usize> {
    if block.contains("padding") {
        return block.usize("padding");
    }
    Ok(if block.flag("pad") {
        size.saturating_sub(1) / 2
    } else {
        0
    })
}

fn block_activation(block: &ConfigBlock) -> Result<Activation> {
    Activation::from_name(block.str_or("activation", "linear")?)
}

fn at_block(index: usize, err: Error) -> Error {
    match err {
        Error::ConfigFormat { line, reason } => Error::ConfigFormat {
            line,
            reason: format!("block {index}: {reason}"),
        },
        other => other,
    }
}

impl Net {
    /// Instantiates one or more layers per block, tracking the running
    /// output shape so every layer knows its input size.
    pub fn from_spec(spec: &NetworkSpec) -> Result<Self> {
        let mut layers: Vec<Box<dyn NetLayer>> = Vec::new();

        let first = spec
            .get(0)
            .ok_or_else(|| Error::config(None, "config has no blocks"))?;
        if BlockKind::from_name(first.name()).map_err(|e| at_block(0, e))? != BlockKind::Net {
            return Err(Error::config(
                None,
                format!("block 0 must be [net], found [{}]", first.name()),
            ));
        }
        let input = InputLayer::with_dimensions(
            first.usize("channels").map_err(|e| at_block(0, e))?,
            first.usize("width").map_err(|e| at_block(0, e))?,
            first.usize("height").map_err(|e| at_block(0, e))?,
        );
        let mut dim = Dim::of(&input);
        layers.push(Box::new(input));

        for (index, block) in spec.blocks().iter().enumerate().skip(1) {
            let kind = BlockKind::from_name(block.name()).map_err(|e| at_block(index, e))?;
            let added = Self::build_block(index, kind, block, dim).map_err(|e| at_block(index, e))?;
            for layer in added {
                debug!(
                    "built {} -> {}x{}x{}",
                    layer.name(),
                    layer.out_sx(),
                    layer.out_sy(),
                    layer.out_depth()
                );
                dim = Dim::of(layer.as_ref());
                layers.push(layer);
            }
        }

        Ok(Self::from_layers(layers))
    }

    fn build_block(
        index: usize,
        kind: BlockKind,
        block: &ConfigBlock,
        dim: Dim,
    ) -> Result<Vec<Box<dyn NetLayer>>> {
        let layers: Vec<Box<dyn NetLayer>> = match kind {
            BlockKind::Net => {
                return Err(Error::config(None, "[net] is only allowed as block 0"));
            }
            BlockKind::Convolutional => {
                let size = block.usize("size")?;
                let batch_normalize = block.flag("batch_normalize");
                let layer = ConvLayer::builder(
                    index,
                    block.usize("filters")?,
                    size,
                    dim.in_depth,
                    dim.in_sx,
                    dim.in_sy,
                )
                .stride(block.usize_or("stride", 1)?)
                .padding(block_padding(block, size)?)
                .activation(block_activation(block)?)
                .batch_normalize(batch_normalize)
                .build()?;

                let mut layers: Vec<Box<dyn NetLayer>> = Vec::new();
                if batch_normalize {
                    let norm = BatchNormLayer::new(
                        index,
                        layer.out_sx(),
                        layer.out_sy(),
                        layer.out_depth(),
                    );
                    layers.push(Box::new(layer));
                    layers.push(Box::new(norm));
                } else {
                    layers.push(Box::new(layer));
                }
                layers
            }
            BlockKind::MaxPool => {
                let size = block.usize("size")?;
                let layer = PoolLayer::builder(index, size, dim.in_depth, dim.in_sx, dim.in_sy)
                    .stride(block.usize_or("stride", size)?)
                    .build()?;
                vec![Box::new(layer)]
            }
            BlockKind::Local => {
                let size = block.usize("size")?;
                let layer = LocalLayer::builder(
                    index,
                    block.usize("filters")?,
                    size,
                    dim.in_depth,
                    dim.in_sx,
                    dim.in_sy,
                )
                .stride(block.usize_or("stride", 1)?)
                .padding(block_padding(block, size)?)
                .activation(block_activation(block)?)
                .build()?;
                vec![Box::new(layer)]
            }
            BlockKind::Dropout => {
                let probability = block.float_or("probability", 0.5)?;
                vec![Box::new(DropoutLayer::new(
                    index,
                    probability,
                    dim.in_sx,
                    dim.in_sy,
                    dim.in_depth,
                ))]
            }
            BlockKind::Connected => {
                let layer = FullyConnLayer::builder(
                    index,
                    block.usize("output")?,
                    dim.in_sx,
                    dim.in_sy,
                    dim.in_depth,
                )
                .activation(block_activation(block)?)
                .batch_normalize(block.flag("batch_normalize"))
                .build();
                vec![Box::new(layer)]
            }
            BlockKind::Detection => {
                let layer = DetectionLayer::new(
                    index,
                    block.usize("side")?,
                    block.usize("num")?,
                    block.usize("classes")?,
                    dim.in_sx * dim.in_sy * dim.in_depth,
                )?;
                vec![Box::new(layer)]
            }
        };
        Ok(layers)
    }

    pub(crate) fn from_layers(layers: Vec<Box<dyn NetLayer>>) -> Self {
        let weight_specs = layers.iter().filter_map(|l| l.weight_spec()).collect();
        Self {
            layers,
            weight_specs,
        }
    }

    pub fn layers(&self) -> &[Box<dyn NetLayer>] {
        &self.layers
    }

    /// `(width, height, depth)` of the last layer.
    pub fn output_shape(&self) -> (usize, usize, usize) {
        self.layers
            .last()
            .map(|l| (l.out_sx(), l.out_sy(), l.out_depth()))
            .unwrap_or((0, 0, 0))
    }

    /// Total parameter count over every layer.
    pub fn param_count(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| l.weights())
            .map(|t| t.len())
            .sum()
    }

    /// Re-initializes all kernels with scaled Gaussian noise.
    pub fn randomize(&mut self) {
        for layer in &mut self.layers {
            layer.randomize();
        }
    }

    pub fn write_snapshot<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn read_snapshot<R: Read>(reader: R) -> Result<Self> {
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Saves the registry, parameters included, as a bincode snapshot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_snapshot(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_snapshot(BufReader::new(File::open(path)?))
    }
}

impl LayerRegistry for Net {
    fn weight_specs(&self) -> &[LayerWeightSpec] {
        &self.weight_specs
    }

    fn layer(&self, name: &str) -> Option<&dyn NetLayer> {
        self.layers
            .iter()
            .find(|l| l.name() == name)
            .map(|l| l.as_ref())
    }

    fn set_weights(&mut self, name: &str, weights: Vec<Tensor>) -> Result<()> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.name() == name)
            .ok_or_else(|| Error::config(None, format!("no layer named `{name}`")))?;
        layer.set_weights(weights)
    }
}
