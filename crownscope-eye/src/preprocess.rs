//! Image preprocessing for square-input segmentation networks

use crate::error::VisionError;
use image::{imageops, Rgb, RgbImage};

/// Gray used by YOLO exports for letterbox padding.
pub const PAD_VALUE: u8 = 114;

/// Aspect-preserving fit of a source image into a square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub src_width: u32,
    pub src_height: u32,
    pub input_size: u32,
    /// Width and height of the resized image inside the canvas
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn new(src_width: u32, src_height: u32, input_size: u32) -> Result<Self, VisionError> {
        if src_width == 0 || src_height == 0 {
            return Err(VisionError::Processing("Image dimensions cannot be zero".to_string()));
        }
        if input_size == 0 {
            return Err(VisionError::Processing("Input size cannot be zero".to_string()));
        }

        let scale = (input_size as f32 / src_width as f32).min(input_size as f32 / src_height as f32);
        let scaled_width = ((src_width as f32 * scale).round() as u32).clamp(1, input_size);
        let scaled_height = ((src_height as f32 * scale).round() as u32).clamp(1, input_size);

        Ok(Self {
            src_width,
            src_height,
            input_size,
            scaled_width,
            scaled_height,
            scale,
            pad_x: (input_size - scaled_width) / 2,
            pad_y: (input_size - scaled_height) / 2,
        })
    }

    /// Source pixel coordinates to network input coordinates
    pub fn map_to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale_x() + self.pad_x as f32,
            y * self.scale_y() + self.pad_y as f32,
        )
    }

    /// Network input coordinates to source pixel coordinates
    pub fn map_to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale_x(),
            (y - self.pad_y as f32) / self.scale_y(),
        )
    }

    // Rounding the scaled size makes the effective scale differ slightly per axis.
    fn scale_x(&self) -> f32 {
        self.scaled_width as f32 / self.src_width as f32
    }

    fn scale_y(&self) -> f32 {
        self.scaled_height as f32 / self.src_height as f32
    }

    /// Resize and pad `image`, returning a normalized CHW float tensor.
    pub fn tensor(&self, image: &RgbImage) -> Result<Vec<f32>, VisionError> {
        if image.width() != self.src_width || image.height() != self.src_height {
            return Err(VisionError::Processing(format!(
                "Letterbox built for {}x{} applied to {}x{} image",
                self.src_width,
                self.src_height,
                image.width(),
                image.height()
            )));
        }

        let resized = imageops::resize(
            image,
            self.scaled_width,
            self.scaled_height,
            imageops::FilterType::Triangle,
        );

        let mut canvas = RgbImage::from_pixel(self.input_size, self.input_size, Rgb([PAD_VALUE; 3]));
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);

        let side = self.input_size as usize;
        let plane = side * side;
        let mut tensor = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in canvas.enumerate_pixels() {
            let idx = y as usize * side + x as usize;
            tensor[idx] = pixel[0] as f32 / 255.0;
            tensor[plane + idx] = pixel[1] as f32 / 255.0;
            tensor[2 * plane + idx] = pixel[2] as f32 / 255.0;
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landscape_letterbox() {
        let lb = Letterbox::new(2048, 1024, 1024).unwrap();
        assert_eq!(lb.scale, 0.5);
        assert_eq!(lb.scaled_width, 1024);
        assert_eq!(lb.scaled_height, 512);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 256);
    }

    #[test]
    fn test_square_upscale() {
        let lb = Letterbox::new(512, 512, 1024).unwrap();
        assert_eq!(lb.scale, 2.0);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 0);
        assert_eq!(lb.map_to_input(10.0, 20.0), (20.0, 40.0));
    }

    #[test]
    fn test_coordinate_round_trip() {
        let lb = Letterbox::new(1000, 750, 640).unwrap();
        let (ix, iy) = lb.map_to_input(123.0, 456.0);
        let (sx, sy) = lb.map_to_source(ix, iy);
        assert!((sx - 123.0).abs() < 1e-3);
        assert!((sy - 456.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(Letterbox::new(0, 10, 640).is_err());
        assert!(Letterbox::new(10, 10, 0).is_err());
    }

    #[test]
    fn test_tensor_layout_and_padding() {
        let image = RgbImage::from_pixel(64, 32, Rgb([255, 0, 0]));
        let lb = Letterbox::new(64, 32, 64).unwrap();
        let tensor = lb.tensor(&image).unwrap();
        assert_eq!(tensor.len(), 3 * 64 * 64);

        let plane = 64 * 64;
        // top rows are padding
        assert!((tensor[0] - PAD_VALUE as f32 / 255.0).abs() < 1e-6);
        // center pixel comes from the image: pure red
        let center = 32 * 64 + 32;
        assert!((tensor[center] - 1.0).abs() < 1e-2);
        assert!(tensor[plane + center].abs() < 1e-2);
        assert!(tensor[2 * plane + center].abs() < 1e-2);
    }

    #[test]
    fn test_tensor_rejects_mismatched_image() {
        let image = RgbImage::new(10, 10);
        let lb = Letterbox::new(20, 10, 32).unwrap();
        assert!(lb.tensor(&image).is_err());
    }
}
