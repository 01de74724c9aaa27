pub mod contour;
pub mod polygon;
pub mod roi;
pub mod set;

pub use contour::Contour;
pub use polygon::{total_area, Polygon};
pub use roi::{Rgb, Structure};
pub use set::{StructureSet, StructureStore};

/// ROI number of a structure, unique within its structure set.
pub type RoiNumber = u32;
