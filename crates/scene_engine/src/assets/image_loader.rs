//! Image decoding for texture uploads

use super::AssetError;
use std::path::Path;

/// Decoded image ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Row-major pixel bytes, top row first
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per pixel
    pub channels: u8,
}

impl ImageData {
    /// Decode an image file into RGBA8
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        log::debug!("Loading image from {path:?}");

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::info!("Loaded image {width}x{height} from {path:?}");

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
            channels: 4,
        })
    }

    /// Decode an in-memory encoded image into RGBA8
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("Decoded image {width}x{height} from memory");

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
            channels: 4,
        })
    }

    /// Uniform RGBA image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            data: color.repeat(pixel_count),
            width,
            height,
            channels: 4,
        }
    }

    /// RGBA value at `(x, y)` for four-channel images
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if self.channels != 4 || x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.data.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        assert_eq!(img.pixel(3, 3), Some([255, 0, 0, 255]));
        assert_eq!(img.pixel(4, 0), None);
    }

    #[test]
    fn test_decode_png_from_memory() {
        let mut encoded = Vec::new();
        image::RgbImage::from_pixel(3, 1, image::Rgb([1, 2, 3]))
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();

        let img = ImageData::from_bytes(&encoded).unwrap();
        assert_eq!((img.width, img.height, img.channels), (3, 1, 4));
        assert_eq!(img.pixel(2, 0), Some([1, 2, 3, 255]));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(matches!(ImageData::from_bytes(b"not an image"), Err(AssetError::Image(_))));
    }
}
