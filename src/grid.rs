//! Pixel-space boxes to cell-relative grid coordinates and back.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A pixel-space box. Serialized as `[xmin, xmax, ymin, ymax]`, which is
/// also the order used everywhere else in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BndBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl BndBox {
    pub const fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

impl From<[f64; 4]> for BndBox {
    fn from([xmin, xmax, ymin, ymax]: [f64; 4]) -> Self {
        Self::new(xmin, xmax, ymin, ymax)
    }
}

impl From<BndBox> for [f64; 4] {
    fn from(b: BndBox) -> Self {
        [b.xmin, b.xmax, b.ymin, b.ymax]
    }
}

/// A box in an `s x s` grid: the center `(x, y)` relative to its cell,
/// where `(0, 0)` is the cell's top left, and the size `(w, h)` in cell units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub cell_x: usize,
    pub cell_y: usize,
}

impl GridCoord {
    /// Fails with `OutsideGrid` when the box center is not inside the image.
    pub fn from_bndbox(bndbox: &BndBox, img_width: f64, img_height: f64, s: usize) -> Result<Self> {
        let grid = s as f64;
        let center_x = (bndbox.xmin + bndbox.xmax) / 2.0 / img_width * grid;
        let center_y = (bndbox.ymin + bndbox.ymax) / 2.0 / img_height * grid;

        // also rejects NaN from a zero-sized image
        if !(0.0..grid).contains(&center_x) || !(0.0..grid).contains(&center_y) {
            return Err(Error::OutsideGrid {
                center_x,
                center_y,
                s,
            });
        }

        let cell_x = center_x.floor() as usize;
        let cell_y = center_y.floor() as usize;
        Ok(Self {
            x: center_x - cell_x as f64,
            y: center_y - cell_y as f64,
            w: bndbox.width() / img_width * grid,
            h: bndbox.height() / img_height * grid,
            cell_x,
            cell_y,
        })
    }

    /// Inverse of `from_bndbox`, rounded to whole pixels (halves away from zero).
    pub fn to_bndbox(&self, img_width: f64, img_height: f64, s: usize) -> BndBox {
        let grid = s as f64;
        let cx = (self.x + self.cell_x as f64) * img_width / grid;
        let cy = (self.y + self.cell_y as f64) * img_height / grid;
        let ww = self.w * img_width / grid;
        let hh = self.h * img_height / grid;

        BndBox::new(
            (cx - ww / 2.0).round(),
            (cx + ww / 2.0).round(),
            (cy - hh / 2.0).round(),
            (cy + hh / 2.0).round(),
        )
    }
}
