use thiserror::Error;

/// Errors produced while parsing configs, loading weights or converting labels.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed config line, or a block/key the builder or loader needs is missing.
    #[error("config format error{}: {reason}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    ConfigFormat { line: Option<usize>, reason: String },

    /// Annotation references a class name that is not in the class table.
    #[error("unknown class `{0}`")]
    UnknownClass(String),

    /// Class index does not fit in the tensor or the class table.
    #[error("class index {index} out of range for {classes} classes")]
    ClassOutOfRange { index: usize, classes: usize },

    /// Weight source ended in the middle of a read.
    #[error("unexpected end of weight stream at byte {offset}: needed {needed} bytes, {available} available")]
    UnexpectedEndOfStream {
        offset: u64,
        needed: usize,
        available: usize,
    },

    /// Weight section for a layer kind the loader does not populate.
    #[error("unsupported weight section `{kind}` in block {block_index}")]
    UnsupportedLayer { block_index: usize, kind: String },

    /// A layer rejected the buffers it was given.
    #[error("layer `{layer}` rejected weights: {reason}")]
    WeightShape { layer: String, reason: String },

    /// Box center falls outside the image, so no grid cell owns it.
    #[error("box center ({center_x}, {center_y}) is outside the {s}x{s} grid")]
    OutsideGrid { center_x: f64, center_y: f64, s: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),
}

impl Error {
    pub fn config(line: Option<usize>, reason: impl Into<String>) -> Self {
        Self::ConfigFormat {
            line,
            reason: reason.into(),
        }
    }

    pub fn weight_shape(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WeightShape {
            layer: layer.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_mentions_line() {
        let err = Error::config(Some(12), "missing `=`");
        assert_eq!(err.to_string(), "config format error at line 12: missing `=`");

        let err = Error::config(None, "no [net] block");
        assert_eq!(err.to_string(), "config format error: no [net] block");
    }

    #[test]
    fn end_of_stream_reports_offsets() {
        let err = Error::UnexpectedEndOfStream {
            offset: 20,
            needed: 16,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("byte 20"));
        assert!(msg.contains("needed 16"));
        assert!(msg.contains("3 available"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
