//! Annotation records to detection grid tensors and back.
//!
//! A cell of the `s x s` grid holds `b * 5 + c` channels: confidence,
//! `(x, y, w, h)` of the object, a second box slot that stays zero, then
//! the one-hot class starting at channel 10 whatever `b` is. Only one
//! object is kept per cell; later objects mapping to a claimed cell are
//! dropped.

mod classes;

pub use classes::*;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    grid::{BndBox, GridCoord},
    utils::argmax,
    Float, Vol,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedObject {
    pub name: String,
    pub bndbox: BndBox,
}

/// One image's labels. Extra per-object fields such as `difficult` are
/// ignored when reading and never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "image-size")]
    pub image_size: ImageSize,
    pub objects: Vec<AnnotatedObject>,
}

impl Annotation {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// First one-hot class channel of a cell.
pub const CLASS_OFFSET: usize = 10;

/// Grid layout: `s x s` cells, `b` box slots and `c` classes per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    s: usize,
    b: usize,
    c: usize,
}

impl GridConfig {
    pub fn builder() -> GridConfigBuilder {
        GridConfigBuilder::new()
    }

    pub fn s(&self) -> usize {
        self.s
    }

    pub fn b(&self) -> usize {
        self.b
    }

    pub fn c(&self) -> usize {
        self.c
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { s: 7, b: 2, c: 20 }
    }
}

pub struct GridConfigBuilder {
    s: usize,
    b: usize,
    c: usize,
}

impl GridConfigBuilder {
    pub fn new() -> Self {
        let GridConfig { s, b, c } = GridConfig::default();
        Self { s, b, c }
    }

    /// default: 7
    pub fn s(mut self, value: usize) -> Self {
        self.s = value;
        self
    }

    /// default: 2
    pub fn b(mut self, value: usize) -> Self {
        self.b = value;
        self
    }

    /// default: 20
    pub fn c(mut self, value: usize) -> Self {
        self.c = value;
        self
    }

    pub fn build(self) -> Result<GridConfig> {
        if self.s == 0 || self.b == 0 || self.c == 0 {
            return Err(Error::config(
                None,
                format!(
                    "grid needs s, b and c above zero, got s={} b={} c={}",
                    self.s, self.b, self.c
                ),
            ));
        }
        let depth = self.b * 5 + self.c;
        if CLASS_OFFSET + self.c > depth {
            return Err(Error::config(
                None,
                format!(
                    "{} classes from channel {CLASS_OFFSET} do not fit a cell of depth {depth} (b={})",
                    self.c, self.b
                ),
            ));
        }
        Ok(GridConfig {
            s: self.s,
            b: self.b,
            c: self.c,
        })
    }
}

impl Default for GridConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelCodec {
    s: usize,
    b: usize,
    c: usize,
}

impl LabelCodec {
    pub fn new(config: GridConfig) -> Self {
        Self {
            s: config.s,
            b: config.b,
            c: config.c,
        }
    }

    /// Channels per cell.
    pub fn depth(&self) -> usize {
        self.b * 5 + self.c
    }

    pub fn encode(&self, annotation: &Annotation) -> Result<Vol> {
        let ImageSize { width, height, .. } = annotation.image_size;
        let mut tensor = Vol::zeros(self.s, self.s, self.depth());

        for object in &annotation.objects {
            let class = class_index(&object.name)
                .ok_or_else(|| Error::UnknownClass(object.name.clone()))?;
            if class >= self.c {
                return Err(Error::ClassOutOfRange {
                    index: class,
                    classes: self.c,
                });
            }
            let coord = GridCoord::from_bndbox(&object.bndbox, width, height, self.s)?;

            let cell = tensor.column_mut(coord.cell_x, coord.cell_y);
            if cell[0] != 0.0 {
                debug!(
                    "cell ({}, {}) already claimed, dropping {}",
                    coord.cell_x, coord.cell_y, object.name
                );
                continue;
            }
            cell[0] = 1.0;
            cell[1] = coord.x as Float;
            cell[2] = coord.y as Float;
            cell[3] = coord.w as Float;
            cell[4] = coord.h as Float;
            cell[CLASS_OFFSET + class] = 1.0;
        }

        Ok(tensor)
    }

    /// Reads back every cell whose confidence is exactly 1, row by row.
    /// The grid size is taken from the tensor.
    pub fn decode(
        &self,
        tensor: &Vol,
        img_width: f64,
        img_height: f64,
        img_depth: f64,
    ) -> Result<Annotation> {
        let classes = CLASS_OFFSET..CLASS_OFFSET + self.c;
        if tensor.depth() < classes.end {
            return Err(Error::config(
                None,
                format!(
                    "tensor depth {} cannot hold {} class channels from {CLASS_OFFSET}",
                    tensor.depth(),
                    self.c
                ),
            ));
        }
        let s = tensor.sx();

        let mut objects = Vec::new();
        for cell_y in 0..tensor.sy() {
            for cell_x in 0..s {
                let cell = tensor.column(cell_x, cell_y);
                if cell[0] != 1.0 {
                    continue;
                }
                let coord = GridCoord {
                    x: f64::from(cell[1]),
                    y: f64::from(cell[2]),
                    w: f64::from(cell[3]),
                    h: f64::from(cell[4]),
                    cell_x,
                    cell_y,
                };
                // non-empty, checked above
                let index = argmax(&cell[classes.clone()]).unwrap_or(0);
                let name = class_name(index).ok_or(Error::ClassOutOfRange {
                    index,
                    classes: CLASS_NAMES.len(),
                })?;
                objects.push(AnnotatedObject {
                    name: name.to_string(),
                    bndbox: coord.to_bndbox(img_width, img_height, s),
                });
            }
        }

        Ok(Annotation {
            image_size: ImageSize {
                width: img_width,
                height: img_height,
                depth: img_depth,
            },
            objects,
        })
    }

    pub fn encode_json(&self, json: &str) -> Result<Vol> {
        self.encode(&Annotation::from_json(json)?)
    }

    pub fn decode_to_json(
        &self,
        tensor: &Vol,
        img_width: f64,
        img_height: f64,
        img_depth: f64,
    ) -> Result<String> {
        self.decode(tensor, img_width, img_height, img_depth)?
            .to_json()
    }
}

impl Default for LabelCodec {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn object(name: &str, bndbox: [f64; 4]) -> AnnotatedObject {
        AnnotatedObject {
            name: name.to_string(),
            bndbox: bndbox.into(),
        }
    }

    fn annotation(objects: Vec<AnnotatedObject>) -> Annotation {
        Annotation {
            image_size: ImageSize {
                width: 400.0,
                height: 400.0,
                depth: 3.0,
            },
            objects,
        }
    }

    #[test]
    fn encodes_one_object() {
        let codec = LabelCodec::default();
        let tensor = codec
            .encode(&annotation(vec![object("dog", [100.0, 200.0, 50.0, 150.0])]))
            .unwrap();

        assert_eq!((tensor.sx(), tensor.sy(), tensor.depth()), (7, 7, 30));
        let cell = tensor.column(2, 1);
        assert_eq!(cell[0], 1.0);
        assert_relative_eq!(cell[1], 0.625, epsilon = 1e-6);
        assert_relative_eq!(cell[2], 0.75, epsilon = 1e-6);
        assert_relative_eq!(cell[3], 1.75, epsilon = 1e-6);
        assert_relative_eq!(cell[4], 1.75, epsilon = 1e-6);
        assert!(cell[5..10].iter().all(|v| *v == 0.0));
        assert_eq!(cell[10 + 11], 1.0);
        assert_eq!(cell[10..].iter().sum::<f32>(), 1.0);
        assert_eq!(tensor.w.iter().filter(|v| **v != 0.0).count(), 6);
    }

    #[test]
    fn round_trip() {
        let codec = LabelCodec::default();
        let original = annotation(vec![
            object("person", [10.0, 60.0, 20.0, 380.0]),
            object("car", [200.0, 390.0, 250.0, 330.0]),
            object("tvmonitor", [300.0, 340.0, 10.0, 50.0]),
        ]);
        let tensor = codec.encode(&original).unwrap();
        let back = codec.decode(&tensor, 400.0, 400.0, 3.0).unwrap();

        assert_eq!(back.image_size, original.image_size);
        assert_eq!(back.objects.len(), 3);
        for expected in &original.objects {
            let found = back
                .objects
                .iter()
                .find(|o| o.name == expected.name)
                .unwrap();
            let (a, b) = (<[f64; 4]>::from(expected.bndbox), <[f64; 4]>::from(found.bndbox));
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() <= 1.0);
            }
        }
    }

    #[test]
    fn decode_scans_rows_first() {
        let codec = LabelCodec::default();
        let tensor = codec
            .encode(&annotation(vec![
                object("cat", [330.0, 370.0, 330.0, 370.0]),
                object("bird", [330.0, 370.0, 10.0, 30.0]),
                object("boat", [10.0, 30.0, 330.0, 370.0]),
            ]))
            .unwrap();
        let back = codec.decode(&tensor, 400.0, 400.0, 3.0).unwrap();
        let names: Vec<_> = back.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["bird", "boat", "cat"]);
    }

    #[test]
    fn first_object_claims_the_cell() {
        let codec = LabelCodec::default();
        let tensor = codec
            .encode(&annotation(vec![
                object("dog", [100.0, 200.0, 50.0, 150.0]),
                object("horse", [110.0, 190.0, 60.0, 140.0]),
            ]))
            .unwrap();

        let cell = tensor.column(2, 1);
        assert_eq!(cell[0], 1.0);
        assert_eq!(cell[10 + 11], 1.0);
        assert_eq!(cell[10 + 12], 0.0);
        assert_relative_eq!(cell[3], 1.75, epsilon = 1e-6);

        let back = codec.decode(&tensor, 400.0, 400.0, 3.0).unwrap();
        assert_eq!(back.objects.len(), 1);
        assert_eq!(back.objects[0].name, "dog");
    }

    #[test]
    fn class_channels_start_at_ten_for_any_box_count() {
        let codec = LabelCodec::new(GridConfig::builder().b(3).build().unwrap());
        let tensor = codec
            .encode(&annotation(vec![object("person", [100.0, 200.0, 50.0, 150.0])]))
            .unwrap();

        assert_eq!(tensor.depth(), 35);
        let cell = tensor.column(2, 1);
        assert_eq!(cell[10 + 14], 1.0);
        assert_eq!(cell[15 + 14], 0.0);
        assert_eq!(cell[10..].iter().sum::<f32>(), 1.0);

        let back = codec.decode(&tensor, 400.0, 400.0, 3.0).unwrap();
        assert_eq!(back.objects.len(), 1);
        assert_eq!(back.objects[0].name, "person");
    }

    #[test]
    fn unknown_class_fails() {
        let err = LabelCodec::default()
            .encode(&annotation(vec![object("unicorn", [0.0, 10.0, 0.0, 10.0])]))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownClass(name) if name == "unicorn"));
    }

    #[test]
    fn class_beyond_grid_classes_fails() {
        let config = GridConfig::builder().c(5).build().unwrap();
        let err = LabelCodec::new(config)
            .encode(&annotation(vec![object("person", [0.0, 10.0, 0.0, 10.0])]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ClassOutOfRange {
                index: 14,
                classes: 5
            }
        ));
    }

    #[test]
    fn decode_rejects_indices_past_the_table() {
        let codec = LabelCodec::new(GridConfig::builder().c(25).build().unwrap());
        let mut tensor = Vol::zeros(7, 7, codec.depth());
        tensor.set(0, 0, 0, 1.0);
        tensor.set(0, 0, 10 + 22, 1.0);
        assert!(matches!(
            codec.decode(&tensor, 400.0, 400.0, 3.0),
            Err(Error::ClassOutOfRange { index: 22, .. })
        ));
    }

    #[test]
    fn json_records() {
        let json = r#"{
            "image-size": {"width": 400, "height": 400, "depth": 3},
            "objects": [
                {"name": "dog", "bndbox": [100, 200, 50, 150], "difficult": 0}
            ]
        }"#;
        let codec = LabelCodec::default();
        let tensor = codec.encode_json(json).unwrap();
        assert_eq!(tensor.get(2, 1, 0), 1.0);

        let out = codec.decode_to_json(&tensor, 400.0, 400.0, 3.0).unwrap();
        assert!(!out.contains("difficult"));
        let back = Annotation::from_json(&out).unwrap();
        assert_eq!(back.objects[0].name, "dog");
        assert_eq!(<[f64; 4]>::from(back.objects[0].bndbox), [100.0, 200.0, 50.0, 150.0]);
    }

    #[test]
    fn grid_config_validation() {
        assert_eq!(GridConfig::builder().build().unwrap(), GridConfig::default());
        assert!(GridConfig::builder().s(0).build().is_err());
        assert!(matches!(
            GridConfig::builder().b(1).build(),
            Err(Error::ConfigFormat { line: None, .. })
        ));
    }

    #[test]
    fn decode_rejects_shallow_tensors() {
        let codec = LabelCodec::default();
        let tensor = Vol::zeros(7, 7, 25);
        assert!(matches!(
            codec.decode(&tensor, 400.0, 400.0, 3.0),
            Err(Error::ConfigFormat { .. })
        ));
    }
}
