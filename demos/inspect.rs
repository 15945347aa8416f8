use std::{env, error::Error};

use log::info;
use yolov1_rust::{
    cfg::NetworkSpec,
    weights::{expected_bytes, LoadOptions, Version, WeightLoader},
    LayerRegistry, Net, NetLayer,
};

// usage: inspect [cfg|-] [weights] [snapshot]
// `-` or no cfg uses the builtin yolov1 config.
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let spec = match args.first().map(String::as_str) {
        None | Some("-") => NetworkSpec::yolov1()?,
        Some(path) => NetworkSpec::from_file(path)?,
    };

    for (i, block) in spec.blocks().iter().enumerate() {
        let fields: Vec<String> = block
            .fields()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("{i:>3} [{}] {}", block.name(), fields.join(" "));
    }

    let mut net = Net::from_spec(&spec)?;
    for layer in net.layers() {
        println!(
            "{:<14} {:>4}x{:<4} x{:<5} params {}",
            layer.name(),
            layer.out_sx(),
            layer.out_sy(),
            layer.out_depth(),
            layer.weights().iter().map(|t| t.len()).sum::<usize>()
        );
    }
    println!(
        "expected weight file: {} bytes (v0.1), {} bytes (v0.2)",
        expected_bytes(net.weight_specs(), Version::new(0, 1, 0)),
        expected_bytes(net.weight_specs(), Version::new(0, 2, 0))
    );

    let Some(weights) = args.get(1) else {
        return Ok(());
    };
    let report = WeightLoader::new(&spec, LoadOptions::default()).load_file(&mut net, weights)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(out) = args.get(2) {
        net.save(out)?;
        info!("snapshot written to {out}");
    }

    Ok(())
}
