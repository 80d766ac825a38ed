//! データ拡張

pub mod color;
pub mod geometric;

pub use color::{
    ColorAugmenter, ColorStrategy, HueSaturationDraw, HueSaturationJitter, MeanRelativeDraw,
    MeanRelativeJitter,
};
pub use geometric::{GeometricDraw, augment_geometry, augment_geometry_dyn};
