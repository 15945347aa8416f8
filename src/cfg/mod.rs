//! Darknet style network descriptions.
//!
//! ```text
//! [net]
//! width=448
//! height=448
//! channels=3
//!
//! [convolutional]
//! batch_normalize=1
//! filters=64
//! size=7
//! ```

mod block;
mod value;

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use block::*;
pub use value::*;

/// Darknet configuration of the original YOLO detector.
pub const YOLOV1_CFG: &str = include_str!("../../resources/yolov1.cfg");

/// The parsed blocks in file order. Block 0 is the `[net]` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkSpec {
    blocks: Vec<ConfigBlock>,
}

impl NetworkSpec {
    pub fn parse(text: &str) -> Result<Self> {
        let state = text
            .lines()
            .enumerate()
            .try_fold(ParserState::default(), |state, (i, line)| {
                state.feed(i + 1, line)
            })?;
        Ok(state.finish())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn yolov1() -> Result<Self> {
        Self::parse(YOLOV1_CFG)
    }

    pub fn from_blocks(blocks: Vec<ConfigBlock>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[ConfigBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ConfigBlock> {
        self.blocks.get(index)
    }
}

/// Accumulator threaded through the line scan.
#[derive(Debug, Default)]
struct ParserState {
    done: Vec<ConfigBlock>,
    current: Option<ConfigBlock>,
}

impl ParserState {
    fn feed(mut self, line_no: usize, line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(self);
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| {
                Error::config(Some(line_no), format!("unterminated block header `{line}`"))
            })?;
            self.done.extend(self.current.take());
            self.current = Some(ConfigBlock::new(name.trim()));
            return Ok(self);
        }

        let mut parts = line.split('=');
        let (key, rhs) = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(rhs), None) => (key.trim(), rhs),
            _ => {
                return Err(Error::config(
                    Some(line_no),
                    format!("expected exactly one `=` in `{line}`"),
                ))
            }
        };

        let block = self
            .current
            .as_mut()
            .ok_or_else(|| Error::config(Some(line_no), "no current block"))?;
        block.insert(key, Value::parse_rhs(rhs));

        Ok(self)
    }

    fn finish(mut self) -> NetworkSpec {
        self.done.extend(self.current.take());
        NetworkSpec { blocks: self.done }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "
# tiny network
[net]
width=8
height = 8
channels=3
steps=200,400,600

[convolutional]
batch_normalize=1
filters=4
size=3
stride=1
pad=1
activation=leaky

[maxpool]
size=2
stride=2
";

    #[test]
    fn block_order_and_count() {
        let spec = NetworkSpec::parse(SMALL).unwrap();
        let names: Vec<_> = spec.blocks().iter().map(|b| b.name()).collect();
        assert_eq!(names, ["net", "convolutional", "maxpool"]);
        assert_eq!(spec.len(), SMALL.matches('[').count());
    }

    #[test]
    fn values_are_typed() {
        let spec = NetworkSpec::parse(SMALL).unwrap();
        let net = &spec.blocks()[0];
        assert_eq!(net.get("height"), Some(&Value::Int(8)));
        assert_eq!(
            net.get("steps"),
            Some(&Value::List(vec![
                Value::Int(200),
                Value::Int(400),
                Value::Int(600)
            ]))
        );
        let conv = &spec.blocks()[1];
        assert_eq!(conv.get("activation"), Some(&Value::Str("leaky".into())));
    }

    #[test]
    fn missing_equals_is_an_error() {
        let err = NetworkSpec::parse("[net]\nwidth 8\n").unwrap_err();
        assert!(matches!(err, Error::ConfigFormat { line: Some(2), .. }));
    }

    #[test]
    fn two_equals_is_an_error() {
        let err = NetworkSpec::parse("[net]\na=b=c\n").unwrap_err();
        assert!(matches!(err, Error::ConfigFormat { line: Some(2), .. }));
    }

    #[test]
    fn key_before_header_is_an_error() {
        let err = NetworkSpec::parse("width=8\n[net]\n").unwrap_err();
        match err {
            Error::ConfigFormat { line, reason } => {
                assert_eq!(line, Some(1));
                assert_eq!(reason, "no current block");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_blocks_are_kept() {
        let spec = NetworkSpec::parse("[net]\n[dropout]\n[dropout]\n").unwrap();
        assert_eq!(spec.len(), 3);
        assert!(spec.blocks()[2].fields().is_empty());
    }

    #[test]
    fn bundled_yolov1_parses() {
        let spec = NetworkSpec::yolov1().unwrap();
        assert_eq!(spec.blocks()[0].name(), "net");
        assert_eq!(spec.blocks()[0].int("width").unwrap(), 448);
        assert_eq!(
            spec.blocks().iter().filter(|b| b.name() == "convolutional").count(),
            24
        );
        assert_eq!(spec.blocks().last().map(|b| b.name()), Some("detection"));
    }

    #[test]
    fn spec_dumps_to_json() {
        let spec = NetworkSpec::parse(SMALL).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let back: NetworkSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
