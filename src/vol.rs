use serde::{Deserialize, Serialize};

use crate::Float;

// Vol is a 3D volume of numbers with a width (sx), height (sy) and
// depth. Values are stored row by row with depth as the fastest
// axis, so `get(x, y, d)` addresses the same element as `[y][x][d]`
// of an `(sy, sx, depth)` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VolParts")]
pub struct Vol {
    sx: usize,
    sy: usize,
    depth: usize,

    pub w: Vec<Float>,
}

#[derive(Deserialize)]
struct VolParts {
    sx: usize,
    sy: usize,
    depth: usize,
    w: Vec<Float>,
}

impl TryFrom<VolParts> for Vol {
    type Error = String;

    fn try_from(parts: VolParts) -> Result<Self, Self::Error> {
        let VolParts { sx, sy, depth, w } = parts;
        let len = w.len();
        Vol::from_parts(sx, sy, depth, w).ok_or_else(|| {
            format!(
                "vol of {sx}x{sy}x{depth} needs {} values, got {len}",
                sx * sy * depth
            )
        })
    }
}

impl Vol {
    pub fn with_constant(sx: usize, sy: usize, depth: usize, constant: Float) -> Self {
        Self {
            sx,
            sy,
            depth,
            w: vec![constant; sx * sy * depth],
        }
    }

    pub fn zeros(sx: usize, sy: usize, depth: usize) -> Self {
        Self::with_constant(sx, sy, depth, 0.0)
    }

    /// Returns `None` when `w` does not hold `sx * sy * depth` values.
    pub fn from_parts(sx: usize, sy: usize, depth: usize, w: Vec<Float>) -> Option<Self> {
        (w.len() == sx * sy * depth).then_some(Self { sx, sy, depth, w })
    }

    fn get_index(&self, x: usize, y: usize, d: usize) -> usize {
        debug_assert!(x < self.sx && y < self.sy && d < self.depth);
        ((self.sx * y) + x) * self.depth + d
    }

    pub fn get(&self, x: usize, y: usize, d: usize) -> Float {
        let index = self.get_index(x, y, d);
        self.w[index]
    }

    pub fn set(&mut self, x: usize, y: usize, d: usize, value: Float) {
        let index = self.get_index(x, y, d);
        self.w[index] = value
    }

    /// All depth values at one spatial position.
    pub fn column(&self, x: usize, y: usize) -> &[Float] {
        let start = self.get_index(x, y, 0);
        &self.w[start..start + self.depth]
    }

    pub fn column_mut(&mut self, x: usize, y: usize) -> &mut [Float] {
        let start = self.get_index(x, y, 0);
        let depth = self.depth;
        &mut self.w[start..start + depth]
    }

    pub fn sx(&self) -> usize {
        self.sx
    }
    pub fn sy(&self) -> usize {
        self.sy
    }
    pub fn depth(&self) -> usize {
        self.depth
    }
}
