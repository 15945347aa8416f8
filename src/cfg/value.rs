use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed config value. Tokens are coerced in the order int, float, string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Coerces one trimmed token. A token is a string only if it is neither
    /// an integer nor a float literal.
    pub fn coerce(token: &str) -> Self {
        if let Ok(value) = token.parse::<i64>() {
            return Self::Int(value);
        }
        if let Ok(value) = token.parse::<f64>() {
            return Self::Float(value);
        }
        Self::Str(token.to_string())
    }

    /// Parses the right hand side of a `key = v1, v2, ...` line. A single
    /// token is unwrapped from its list.
    pub fn parse_rhs(rhs: &str) -> Self {
        let mut values: Vec<Value> = rhs.split(',').map(|t| Self::coerce(t.trim())).collect();
        if values.len() == 1 {
            values.remove(0)
        } else {
            Self::List(values)
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Ints widen to floats, so `momentum=1` still reads as `1.0`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::List(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}
