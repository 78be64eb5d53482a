//! Image processing utilities for tiled microscopy planes.
//!
//! # Module Organization
//!
//! - **image**: Format conversions between ndarray and image crate types
//! - **io**: Single-plane TIFF decoding (full or region) and encoding
//! - **test_patterns**: Synthetic planes and volumes for validating the pipeline

pub mod image;
pub mod io;
pub mod test_patterns;

pub use image::{
    array2_to_gray16_image, dynamic_image_to_array2, gray16_image_to_array2, Gray16Image,
};
pub use io::{plane_dimensions, read_plane, read_plane_region, save_u16_plane, PlaneIoError};
