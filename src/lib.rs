pub mod cfg;
mod error;
pub mod grid;
pub mod label;
mod layers;
mod net;
mod tensor;
mod utils;
mod vol;
pub mod weights;

use std::path::Path;

pub use error::*;
pub use layers::*;
pub use net::*;
pub use tensor::*;
pub use utils::*;
pub use vol::*;

pub type Float = f32;

/// Parses a darknet config, builds its layers and fills them from the
/// matching weight file.
pub fn load_pretrained(
    cfg_path: impl AsRef<Path>,
    weights_path: impl AsRef<Path>,
    options: weights::LoadOptions,
) -> Result<(Net, weights::LoadReport)> {
    let spec = cfg::NetworkSpec::from_file(cfg_path)?;
    let mut net = Net::from_spec(&spec)?;
    net.randomize();
    let report = weights::WeightLoader::new(&spec, options).load_file(&mut net, weights_path)?;
    Ok((net, report))
}
