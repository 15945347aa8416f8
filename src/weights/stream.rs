use std::io::{self, ErrorKind, Read};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    Float, Tensor,
};

/// Darknet weight file revision, the first three `i32`s of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub revision: i32,
}

impl Version {
    pub fn new(major: i32, minor: i32, revision: i32) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Width in bytes of the `seen` counter that follows the version.
    pub fn seen_width(self) -> usize {
        let (major, minor) = (i64::from(self.major), i64::from(self.minor));
        if major + minor >= 2 && major < 1000 && minor < 1000 {
            8
        } else {
            4
        }
    }

    /// Version plus `seen` counter.
    pub fn header_bytes(self) -> u64 {
        12 + self.seen_width() as u64
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Forward-only little-endian reader over a weight file. The cursor counts
/// bytes consumed from the start of the file, header included.
pub struct WeightStream<R> {
    reader: R,
    cursor: u64,
    version: Version,
    seen: i64,
}

impl<R: Read> WeightStream<R> {
    /// Reads the header and leaves the cursor on the first weight value.
    pub fn open(reader: R) -> Result<Self> {
        let mut stream = Self {
            reader,
            cursor: 0,
            version: Version::new(0, 0, 0),
            seen: 0,
        };

        let mut header = [0u8; 12];
        stream.fill(&mut header)?;
        let word = |i: usize| i32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
        stream.version = Version::new(word(0), word(4), word(8));

        stream.seen = if stream.version.seen_width() == 8 {
            let mut bytes = [0u8; 8];
            stream.fill(&mut bytes)?;
            i64::from_le_bytes(bytes)
        } else {
            let mut bytes = [0u8; 4];
            stream.fill(&mut bytes)?;
            i64::from(i32::from_le_bytes(bytes))
        };

        Ok(stream)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Images seen during training, as recorded by darknet.
    pub fn seen(&self) -> i64 {
        self.seen
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn read_f32s(&mut self, count: usize) -> Result<Vec<Float>> {
        let mut bytes = vec![0u8; count * 4];
        self.fill(&mut bytes)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| Float::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Reads `product(shape)` values laid out row-major in `shape`.
    pub fn read_tensor(&mut self, shape: &[usize]) -> Result<Tensor> {
        let count = shape.iter().product();
        let data = self.read_f32s(count)?;
        Tensor::from_shape_vec(shape, data).ok_or_else(|| {
            Error::config(None, format!("cannot shape {count} values as {shape:?}"))
        })
    }

    /// Discards exactly `bytes` bytes.
    pub fn skip(&mut self, bytes: u64) -> Result<()> {
        let offset = self.cursor;
        let skipped = io::copy(&mut (&mut self.reader).take(bytes), &mut io::sink())?;
        self.cursor += skipped;
        if skipped < bytes {
            return Err(Error::UnexpectedEndOfStream {
                offset,
                needed: usize::try_from(bytes).unwrap_or(usize::MAX),
                available: skipped as usize,
            });
        }
        Ok(())
    }

    /// Consumes whatever is left and returns its length.
    pub fn drain(&mut self) -> Result<u64> {
        let rest = io::copy(&mut self.reader, &mut io::sink())?;
        self.cursor += rest;
        Ok(rest)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let offset = self.cursor;
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.cursor += filled as u64;
        if filled < buf.len() {
            return Err(Error::UnexpectedEndOfStream {
                offset,
                needed: buf.len(),
                available: filled,
            });
        }
        Ok(())
    }
}
