// THEORY:
// The `detection` module defines the raw vocabulary the engine speaks with the
// outside world. Everything upstream of it (capture, decoding, the detector model)
// is a black box that hands us, once per frame, a flat list of labelled boxes.
//
// Key architectural principles:
// 1.  **Dumb Data Containers**: `Detection`, `BoundingBox` and `Point` carry no
//     memory. A `Detection` lives for exactly one frame and is discarded after the
//     orchestrator has routed it to the tracker or to a signal gate.
// 2.  **Validation at the Boundary**: A malformed box or an out-of-range confidence
//     is rejected here, before it can reach any stateful component. The stateful
//     layers downstream are therefore total functions over well-formed input.
// 3.  **Pixel Space**: All coordinates are integer pixels; centroids and distances
//     are computed in `f64` so that sub-pixel centres are not rounded away.

use crate::error::InputError;
use serde::{Deserialize, Serialize};

/// The object classes the external detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Person,
    Weapon,
    #[serde(alias = "fight")]
    FightSignal,
}

/// A point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Squared Euclidean distance. Used wherever only an ordering or a threshold
    /// comparison is needed.
    pub fn distance_sq(&self, other: &Point) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }
}

/// An axis-aligned box given by its top-left `(x1, y1)` and bottom-right `(x2, y2)` corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_well_formed(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// The geometric centre `((x1 + x2) / 2, (y1 + y2) / 2)`.
    pub fn centroid(&self) -> Point {
        Point {
            x: (self.x1 as f64 + self.x2 as f64) / 2.0,
            y: (self.y1 as f64 + self.y2 as f64) / 2.0,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// The smallest box that contains both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A single object reported by the detector for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_label: ObjectClass,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(class_label: ObjectClass, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            class_label,
            bbox,
            confidence,
        }
    }

    /// Checks the box geometry and the confidence range. A detection that fails
    /// is dropped by the caller; it never aborts the frame it arrived in.
    pub fn validate(&self) -> Result<(), InputError> {
        if !self.bbox.is_well_formed() {
            let b = self.bbox;
            return Err(InputError::InvalidBox {
                x1: b.x1,
                y1: b.y1,
                x2: b.x2,
                y2: b.y2,
            });
        }
        // NaN fails the range check as well.
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(InputError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}
