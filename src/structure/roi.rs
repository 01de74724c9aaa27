use serde::{Deserialize, Serialize};

use super::{Contour, RoiNumber};

/// Display color of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// A named, colored region of interest made of per-slice contours.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub roi_number: RoiNumber,
    pub name: String,
    pub color: Rgb,
    /// Contours ordered by slice position.
    pub contours: Vec<Contour>,
}

impl Structure {
    /// Creates a structure with no contours.
    #[must_use]
    pub fn new(roi_number: RoiNumber, name: impl Into<String>, color: Rgb) -> Self {
        Self {
            roi_number,
            name: name.into(),
            color,
            contours: Vec::new(),
        }
    }

    /// Builder-style setter for the contours; keeps them ordered by slice.
    #[must_use]
    pub fn with_contours(mut self, contours: Vec<Contour>) -> Self {
        self.set_contours(contours);
        self
    }

    /// Replaces all contours, ordering them by slice position.
    pub fn set_contours(&mut self, mut contours: Vec<Contour>) {
        contours.sort_by(|a, b| a.slice_position().total_cmp(&b.slice_position()));
        self.contours = contours;
    }

    /// Returns `true` if the structure has no contours.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }
}
