//! Image format conversion utilities for microscopy plane processing.
//!
//! This module provides conversion functions between ndarray Array2 structures
//! (used by the numerical pipeline) and image crate types (used for file I/O).
//!
//! # Coordinate System Conversions
//!
//! - **ndarray**: Uses matrix indexing [row, col] = [y, x] with (height, width) dimensions
//! - **image crate**: Uses graphics indexing (x, y) with (width, height) dimensions
//!
//! Pixel values are preserved as raw detector counts. No rescaling is applied
//! when widening to f32, so a 16-bit plane keeps values in [0, 65535].

use image::{DynamicImage, ImageBuffer, Luma};
use ndarray::Array2;

/// 16-bit single channel image buffer
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Convert a 16-bit grayscale image into an `Array2<f32>` of raw counts.
///
/// # Coordinate Mapping
/// - Image pixel (x, y) → Array index [y, x]
/// - Image dimensions (width, height) → Array dimensions (height, width)
pub fn gray16_image_to_array2(img: &Gray16Image) -> Array2<f32> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0] as f32
    })
}

/// Convert `Array2<f32>` counts to a 16-bit grayscale image.
///
/// Values are rounded and clamped to [0, 65535].
pub fn array2_to_gray16_image(arr: &Array2<f32>) -> Gray16Image {
    let (height, width) = arr.dim();
    let mut img = Gray16Image::new(width as u32, height as u32);

    for ((y, x), &value) in arr.indexed_iter() {
        let count = value.round().clamp(0.0, u16::MAX as f32) as u16;
        img.put_pixel(x as u32, y as u32, Luma([count]));
    }

    img
}

/// Convert any decoded image to an `Array2<f32>` of single channel counts.
///
/// 8-bit and 16-bit grayscale keep their native range. Float RGB images use
/// the first channel unchanged. Everything else is converted to 16-bit luma.
pub fn dynamic_image_to_array2(img: DynamicImage) -> Array2<f32> {
    match img {
        DynamicImage::ImageLuma8(gray) => {
            let (width, height) = gray.dimensions();
            Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
                gray.get_pixel(x as u32, y as u32)[0] as f32
            })
        }
        DynamicImage::ImageLuma16(gray) => gray16_image_to_array2(&gray),
        DynamicImage::ImageRgb32F(rgb) => {
            let (width, height) = rgb.dimensions();
            Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
                rgb.get_pixel(x as u32, y as u32)[0]
            })
        }
        other => gray16_image_to_array2(&other.into_luma16()),
    }
}
