use anyhow::{Context, Result};
use exif::{In, Reader, Tag, Value};
use image::{imageops, RgbImage};
use std::io::Cursor;

/// EXIF orientation values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExifOrientation {
    /// No orientation specified or undefined
    Undefined = 0,
    /// Normal orientation (0 degrees)
    TopLeft = 1,
    /// Horizontally flipped
    TopRight = 2,
    /// Rotated 180 degrees
    BottomRight = 3,
    /// Vertically flipped
    BottomLeft = 4,
    /// Rotated 90 degrees CCW + horizontally flipped
    LeftTop = 5,
    /// Rotated 90 degrees CW (portrait)
    RightTop = 6,
    /// Rotated 90 degrees CW + horizontally flipped
    RightBottom = 7,
    /// Rotated 90 degrees CCW (portrait)
    LeftBottom = 8,
}

impl From<u32> for ExifOrientation {
    fn from(value: u32) -> Self {
        match value {
            1 => ExifOrientation::TopLeft,
            2 => ExifOrientation::TopRight,
            3 => ExifOrientation::BottomRight,
            4 => ExifOrientation::BottomLeft,
            5 => ExifOrientation::LeftTop,
            6 => ExifOrientation::RightTop,
            7 => ExifOrientation::RightBottom,
            8 => ExifOrientation::LeftBottom,
            _ => ExifOrientation::Undefined,
        }
    }
}

/// Read the EXIF orientation tag from encoded image bytes
///
/// Images without EXIF data (PNG, most WEBP, webcam JPEGs) yield `Undefined`.
pub fn read_exif_orientation(bytes: &[u8]) -> ExifOrientation {
    match try_read_exif_orientation(bytes) {
        Ok(orientation) => orientation,
        Err(e) => {
            log::debug!("No usable EXIF orientation: {e:#}");
            ExifOrientation::Undefined
        }
    }
}

fn try_read_exif_orientation(bytes: &[u8]) -> Result<ExifOrientation> {
    let mut cursor = Cursor::new(bytes);
    let exif = Reader::new()
        .read_from_container(&mut cursor)
        .context("Failed to read EXIF data")?;

    if let Some(field) = exif.get_field(Tag::Orientation, In::PRIMARY) {
        if let Value::Short(values) = &field.value {
            if let Some(&orientation_value) = values.first() {
                return Ok(ExifOrientation::from(orientation_value as u32));
            }
        }
    }

    Ok(ExifOrientation::Undefined)
}

/// Apply EXIF rotation so the returned image is upright
///
/// Handles all 8 possible EXIF orientations by applying
/// the appropriate combination of rotations and flips
pub fn apply_rotation(img: RgbImage, orientation: ExifOrientation) -> RgbImage {
    match orientation {
        ExifOrientation::Undefined | ExifOrientation::TopLeft => img,
        ExifOrientation::TopRight => imageops::flip_horizontal(&img),
        ExifOrientation::BottomRight => imageops::rotate180(&img),
        ExifOrientation::BottomLeft => imageops::flip_vertical(&img),
        // Transpose: mirror across the main diagonal
        ExifOrientation::LeftTop => {
            let rotated = imageops::rotate90(&img);
            imageops::flip_horizontal(&rotated)
        }
        ExifOrientation::RightTop => imageops::rotate90(&img),
        // Transverse: mirror across the anti-diagonal
        ExifOrientation::RightBottom => {
            let rotated = imageops::rotate270(&img);
            imageops::flip_horizontal(&rotated)
        }
        ExifOrientation::LeftBottom => imageops::rotate270(&img),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn marked_image() -> RgbImage {
        // 3x2, red marker in the top-left corner
        ImageBuffer::from_fn(3, 2, |x, y| {
            if x == 0 && y == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_exif_orientation_from_u32() {
        assert_eq!(ExifOrientation::from(1), ExifOrientation::TopLeft);
        assert_eq!(ExifOrientation::from(6), ExifOrientation::RightTop);
        assert_eq!(ExifOrientation::from(8), ExifOrientation::LeftBottom);
        assert_eq!(ExifOrientation::from(99), ExifOrientation::Undefined);
    }

    #[test]
    fn test_apply_rotation_right_top() {
        let rotated = apply_rotation(marked_image(), ExifOrientation::RightTop);
        assert_eq!(rotated.dimensions(), (2, 3));
        // Rotating 90° CW moves the top-left corner to the top-right
        assert_eq!(rotated.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    /// 3x2 image where every pixel encodes its own coordinates
    fn coordinate_image() -> RgbImage {
        ImageBuffer::from_fn(3, 2, |x, y| Rgb([x as u8 * 80, y as u8 * 120, 7]))
    }

    #[test]
    fn test_apply_rotation_all_orientations() {
        let src = coordinate_image();
        let (w, h) = src.dimensions();

        // Source coordinate each output pixel must come from
        type Mapping = fn(u32, u32, u32, u32) -> (u32, u32);
        let cases: [(u32, (u32, u32), Mapping); 8] = [
            (1, (w, h), |x, y, _, _| (x, y)),
            (2, (w, h), |x, y, w, _| (w - 1 - x, y)),
            (3, (w, h), |x, y, w, h| (w - 1 - x, h - 1 - y)),
            (4, (w, h), |x, y, _, h| (x, h - 1 - y)),
            (5, (h, w), |x, y, _, _| (y, x)),
            (6, (h, w), |x, y, _, h| (y, h - 1 - x)),
            (7, (h, w), |x, y, w, h| (w - 1 - y, h - 1 - x)),
            (8, (h, w), |x, y, w, _| (w - 1 - y, x)),
        ];

        for (code, dims, source_of) in cases {
            let out = apply_rotation(src.clone(), ExifOrientation::from(code));
            assert_eq!(out.dimensions(), dims, "dimensions for EXIF {}", code);
            for (x, y, pixel) in out.enumerate_pixels() {
                let (sx, sy) = source_of(x, y, w, h);
                assert_eq!(pixel, src.get_pixel(sx, sy), "EXIF {} at ({}, {})", code, x, y);
            }
        }
    }

    #[test]
    fn test_apply_rotation_identity() {
        let img = marked_image();
        assert_eq!(apply_rotation(img.clone(), ExifOrientation::Undefined), img);
        assert_eq!(apply_rotation(img.clone(), ExifOrientation::TopLeft), img);
    }

    #[test]
    fn test_missing_exif_is_undefined() {
        assert_eq!(read_exif_orientation(b"not an image"), ExifOrientation::Undefined);
    }
}
