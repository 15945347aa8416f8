use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Value;

/// One `[name]` section of a config, with its fields in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigBlock {
    name: String,
    fields: Vec<(String, Value)>,
}

impl ConfigBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Inserts a field. A repeated key replaces the earlier value but keeps
    /// its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Required integer field.
    pub fn int(&self, key: &str) -> Result<i64> {
        let value = self.get(key).ok_or_else(|| self.missing(key))?;
        value.as_int().ok_or_else(|| self.wrong_type(key, "int", value))
    }

    /// Required non-negative integer field.
    pub fn usize(&self, key: &str) -> Result<usize> {
        let value = self.int(key)?;
        usize::try_from(value).map_err(|_| {
            Error::config(
                None,
                format!("[{}] `{key}` must be non-negative, got {value}", self.name),
            )
        })
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64> {
        if self.contains(key) {
            self.int(key)
        } else {
            Ok(default)
        }
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        if self.contains(key) {
            self.usize(key)
        } else {
            Ok(default)
        }
    }

    pub fn float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            Some(value) => value
                .as_float()
                .ok_or_else(|| self.wrong_type(key, "float", value)),
            None => Ok(default),
        }
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.get(key) {
            Some(value) => value
                .as_str()
                .ok_or_else(|| self.wrong_type(key, "string", value)),
            None => Ok(default),
        }
    }

    /// `key=1` (or `1.0`) means set. Absent means false.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Int(v)) => *v == 1,
            Some(Value::Float(v)) => *v == 1.0,
            _ => false,
        }
    }

    fn missing(&self, key: &str) -> Error {
        Error::config(None, format!("[{}] is missing required key `{key}`", self.name))
    }

    fn wrong_type(&self, key: &str, expected: &str, got: &Value) -> Error {
        Error::config(
            None,
            format!(
                "[{}] `{key}` should be {expected}, got {} `{got}`",
                self.name,
                got.type_name()
            ),
        )
    }
}

/// The block kinds the network builder knows how to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Net,
    Convolutional,
    MaxPool,
    Local,
    Dropout,
    Connected,
    Detection,
}

impl BlockKind {
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "net" | "network" => Self::Net,
            "convolutional" | "conv" => Self::Convolutional,
            "maxpool" | "max" => Self::MaxPool,
            "local" => Self::Local,
            "dropout" => Self::Dropout,
            "connected" => Self::Connected,
            "detection" => Self::Detection,
            other => return Err(Error::config(None, format!("unknown block `[{other}]`"))),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Net => "net",
            Self::Convolutional => "convolutional",
            Self::MaxPool => "maxpool",
            Self::Local => "local",
            Self::Dropout => "dropout",
            Self::Connected => "connected",
            Self::Detection => "detection",
        }
    }

    /// Kinds whose parameters are stored in the weight file.
    pub fn has_weights(self) -> bool {
        matches!(self, Self::Convolutional | Self::Local | Self::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> ConfigBlock {
        ConfigBlock::new("convolutional")
            .with("batch_normalize", Value::Int(1))
            .with("filters", Value::Int(64))
            .with("activation", Value::Str("leaky".into()))
    }

    #[test]
    fn repeated_key_keeps_position() {
        let mut block = conv();
        block.insert("filters", Value::Int(32));
        assert_eq!(block.fields()[1].0, "filters");
        assert_eq!(block.int("filters").unwrap(), 32);
        assert_eq!(block.fields().len(), 3);
    }

    #[test]
    fn accessors_check_presence_and_type() {
        let block = conv();
        assert!(block.flag("batch_normalize"));
        assert!(!block.flag("dontload"));
        assert_eq!(block.usize_or("stride", 1).unwrap(), 1);
        assert_eq!(block.int_or("filters", 16).unwrap(), 64);
        assert_eq!(block.str_or("activation", "linear").unwrap(), "leaky");
        assert!(matches!(block.int("size"), Err(Error::ConfigFormat { .. })));
        assert!(matches!(block.int("activation"), Err(Error::ConfigFormat { .. })));
    }

    #[test]
    fn flags_accept_float_one() {
        let block = ConfigBlock::new("convolutional")
            .with("batch_normalize", Value::Float(1.0))
            .with("flipped", Value::Float(0.5))
            .with("dontload", Value::Int(0));
        assert!(block.flag("batch_normalize"));
        assert!(!block.flag("flipped"));
        assert!(!block.flag("dontload"));
    }

    #[test]
    fn negative_counts_are_rejected() {
        let block = ConfigBlock::new("maxpool").with("size", Value::Int(-2));
        assert!(block.usize("size").is_err());
    }

    #[test]
    fn block_kinds() {
        assert_eq!(BlockKind::from_name("net").unwrap(), BlockKind::Net);
        assert_eq!(BlockKind::from_name("maxpool").unwrap(), BlockKind::MaxPool);
        assert!(BlockKind::from_name("convolutional").unwrap().has_weights());
        assert!(!BlockKind::from_name("dropout").unwrap().has_weights());
        assert!(BlockKind::from_name("route").is_err());
    }
}
