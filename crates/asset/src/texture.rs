//! Texture loading and data structures.
//! Textures are decoded to RGBA8 before GPU upload.

use std::path::{Path, PathBuf};

use crate::{
    error::{AssetError, AssetResult},
    gpu::ImageHandle,
};

/// Decoded RGBA8 pixels, row-major, ready for upload.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Wrap RGBA8 pixels, checking the buffer matches the dimensions.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> AssetResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(AssetError::InvalidTexture {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Load and decode an image file (PNG) to RGBA8.
    pub fn load<P: AsRef<Path>>(path: P) -> AssetResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading texture from {:?}", path);

        let img = image::open(path).map_err(|source| match source {
            image::ImageError::IoError(e) => AssetError::io(path, e),
            source => AssetError::Image {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new_rgba8(width, height, rgba.into_raw())
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// A texture registered by name. Pixel data is not kept after upload.
#[derive(Debug)]
pub struct Texture {
    name: String,
    path: PathBuf,
    width: u32,
    height: u32,
    pub(crate) image: Option<ImageHandle>,
}

impl Texture {
    pub(crate) fn new(
        name: String,
        path: PathBuf,
        data: &TextureData,
        image: Option<ImageHandle>,
    ) -> Self {
        Self {
            name,
            path,
            width: data.width,
            height: data.height,
            image,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// GPU image, absent in headless mode.
    pub fn image(&self) -> Option<ImageHandle> {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_buffer_must_match_size() {
        let tex = TextureData::new_rgba8(2, 2, vec![255; 16]).unwrap();
        assert_eq!(tex.byte_len(), 16);

        let err = TextureData::new_rgba8(2, 2, vec![255; 15]).unwrap_err();
        assert!(matches!(err, AssetError::InvalidTexture { len: 15, .. }));
        let err = TextureData::new_rgba8(0, 4, Vec::new()).unwrap_err();
        assert!(matches!(err, AssetError::InvalidTexture { width: 0, .. }));
    }

    #[test]
    fn png_decodes_to_rgba8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let tex = TextureData::load(&path).unwrap();
        assert_eq!((tex.width, tex.height), (3, 2));
        assert_eq!(tex.byte_len(), 3 * 2 * 4);
        assert_eq!(&tex.data[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn missing_image_is_not_found() {
        let err = TextureData::load("/no/such/texture.png").unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
