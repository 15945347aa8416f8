//! Darknet `.weights` ingestion.
//!
//! Sections are read in block order. Convolutional kernels are stored as
//! `(filters, in, kh, kw)` and handed to the registry as
//! `(kh, kw, in, filters)`; batch-norm vectors are stored as
//! `[beta, gamma, mean, variance]` and handed over as
//! `[gamma, beta, mean, variance]`.

mod stream;

pub use stream::*;

use std::{fs::File, io::BufReader, io::Read, path::Path};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::{BlockKind, ConfigBlock, NetworkSpec},
    error::{Error, Result},
    layers::{layer_name, LayerWeightSpec, WeightKind},
    net::LayerRegistry,
    Tensor,
};

const KERNEL_AXES: [usize; 4] = [2, 3, 1, 0];

/// What to do with weight sections the registry cannot take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnsupportedLayerPolicy {
    /// Consume the section by its computed size and carry on.
    #[default]
    Skip,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    unsupported_layers: UnsupportedLayerPolicy,
}

impl LoadOptions {
    pub fn builder() -> LoadOptionsBuilder {
        LoadOptionsBuilder::new()
    }

    pub fn unsupported_layers(&self) -> UnsupportedLayerPolicy {
        self.unsupported_layers
    }
}

pub struct LoadOptionsBuilder {
    unsupported_layers: UnsupportedLayerPolicy,
}

impl LoadOptionsBuilder {
    pub fn new() -> Self {
        Self {
            unsupported_layers: UnsupportedLayerPolicy::Skip,
        }
    }

    /// default: Skip
    pub fn unsupported_layers(mut self, value: UnsupportedLayerPolicy) -> Self {
        self.unsupported_layers = value;
        self
    }

    pub fn build(self) -> LoadOptions {
        LoadOptions {
            unsupported_layers: self.unsupported_layers,
        }
    }
}

impl Default for LoadOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub version: Version,
    pub seen: i64,
    /// Header plus every weight section, trailing bytes excluded.
    pub bytes_read: u64,
    pub layers_loaded: Vec<String>,
    pub skipped: Vec<String>,
    pub trailing_bytes: u64,
}

/// Size a weight file must have for `specs` under `version`.
pub fn expected_bytes(specs: &[LayerWeightSpec], version: Version) -> u64 {
    version.header_bytes() + specs.iter().map(|s| s.expected_bytes()).sum::<u64>()
}

pub struct WeightLoader<'a> {
    spec: &'a NetworkSpec,
    options: LoadOptions,
}

impl<'a> WeightLoader<'a> {
    pub fn new(spec: &'a NetworkSpec, options: LoadOptions) -> Self {
        Self { spec, options }
    }

    pub fn load_file<L>(&self, registry: &mut L, path: impl AsRef<Path>) -> Result<LoadReport>
    where
        L: LayerRegistry + ?Sized,
    {
        let path = path.as_ref();
        info!("loading weights from {}", path.display());
        let file = File::open(path)?;
        self.load(registry, BufReader::new(file))
    }

    /// Reads every section before touching the registry, so a failed load
    /// leaves it unchanged.
    pub fn load<L, R>(&self, registry: &mut L, reader: R) -> Result<LoadReport>
    where
        L: LayerRegistry + ?Sized,
        R: Read,
    {
        let specs = registry.weight_specs().to_vec();
        self.check_specs(&specs)?;

        let mut stream = WeightStream::open(reader)?;
        let version = stream.version();
        info!(
            "weights version {version}, seen counter {} bytes",
            version.seen_width()
        );

        let mut pending: Vec<(String, Vec<Tensor>)> = Vec::new();
        let mut skipped = Vec::new();

        for (index, block) in self.spec.blocks().iter().enumerate().skip(1) {
            let kind = BlockKind::from_name(block.name())?;
            if !kind.has_weights() {
                continue;
            }
            let spec = specs
                .iter()
                .find(|s| s.block_index == index)
                .ok_or_else(|| {
                    Error::config(None, format!("no weight layout for [{}] block {index}", kind.name()))
                })?;
            check_kind(index, kind, spec)?;
            debug!("block {index} [{}] at offset {}", kind.name(), stream.cursor());

            match kind {
                BlockKind::Convolutional => {
                    pending.extend(read_convolutional(&mut stream, index, block, spec)?);
                }
                _ => match self.options.unsupported_layers() {
                    UnsupportedLayerPolicy::Error => {
                        return Err(Error::UnsupportedLayer {
                            block_index: index,
                            kind: kind.name().to_string(),
                        });
                    }
                    UnsupportedLayerPolicy::Skip => {
                        let name = layer_name(kind.name(), index);
                        warn!("skipping {} weight bytes of {name}", spec.expected_bytes());
                        stream.skip(spec.expected_bytes())?;
                        skipped.push(name);
                    }
                },
            }
        }

        let bytes_read = stream.cursor();
        let trailing_bytes = stream.drain()?;
        if trailing_bytes > 0 {
            warn!("{trailing_bytes} trailing bytes after the last weight section");
        }

        let mut layers_loaded = Vec::with_capacity(pending.len());
        for (name, weights) in pending {
            registry.set_weights(&name, weights)?;
            layers_loaded.push(name);
        }
        info!(
            "loaded {} layers, skipped {}, read {bytes_read} bytes",
            layers_loaded.len(),
            skipped.len()
        );

        Ok(LoadReport {
            version,
            seen: stream.seen(),
            bytes_read,
            layers_loaded,
            skipped,
            trailing_bytes,
        })
    }

    fn check_specs(&self, specs: &[LayerWeightSpec]) -> Result<()> {
        for spec in specs {
            let block = self.spec.get(spec.block_index).ok_or_else(|| {
                Error::config(
                    None,
                    format!("weight layout for block {} is out of range", spec.block_index),
                )
            })?;
            if !BlockKind::from_name(block.name())?.has_weights() {
                return Err(Error::config(
                    None,
                    format!(
                        "weight layout for block {} but [{}] has no weights",
                        spec.block_index,
                        block.name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn check_kind(index: usize, kind: BlockKind, spec: &LayerWeightSpec) -> Result<()> {
    let matches = matches!(
        (kind, spec.kind),
        (BlockKind::Convolutional, WeightKind::Convolutional)
            | (BlockKind::Local, WeightKind::Local { .. })
            | (BlockKind::Connected, WeightKind::Connected)
    );
    if matches {
        Ok(())
    } else {
        Err(Error::config(
            None,
            format!(
                "block {index} is [{}] but its layer stores {} weights",
                kind.name(),
                spec.kind.name()
            ),
        ))
    }
}

fn read_convolutional<R: Read>(
    stream: &mut WeightStream<R>,
    index: usize,
    block: &ConfigBlock,
    spec: &LayerWeightSpec,
) -> Result<Vec<(String, Vec<Tensor>)>> {
    let batch_normalize = block.flag("batch_normalize");
    if batch_normalize != spec.has_batchnorm {
        return Err(Error::config(
            None,
            format!(
                "block {index}: batch_normalize={} but the layer was built {} batch norm",
                u8::from(batch_normalize),
                if spec.has_batchnorm { "with" } else { "without" }
            ),
        ));
    }

    let n = spec.filters;
    let norm = if batch_normalize {
        let beta = stream.read_tensor(&[n])?;
        let gamma = stream.read_tensor(&[n])?;
        let mean = stream.read_tensor(&[n])?;
        let variance = stream.read_tensor(&[n])?;
        Some(vec![gamma, beta, mean, variance])
    } else {
        None
    };
    let bias = if !batch_normalize && spec.has_bias {
        Some(stream.read_tensor(&[n])?)
    } else {
        None
    };

    let kernel = stream
        .read_tensor(&[n, spec.input_channels, spec.kernel_h, spec.kernel_w])?
        .transpose(&KERNEL_AXES);

    let mut conv = vec![kernel];
    conv.extend(bias);

    let mut out = vec![(layer_name("conv", index), conv)];
    if let Some(norm) = norm {
        out.push((layer_name("batchnorm", index), norm));
    }
    Ok(out)
}
