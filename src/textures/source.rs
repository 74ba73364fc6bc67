use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use image::RgbaImage;
use tokio::time::Instant;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

use crate::error::{AtlasError, Result};
use crate::textures::types::TextureId;

/// Where the pixels of a texture come from.
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// An encoded image file, read asynchronously.
    Path(PathBuf),
    /// Encoded image bytes (png, jpeg, ...).
    Bytes(Arc<[u8]>),
    /// Already decoded RGBA8 pixels.
    Image(Arc<RgbaImage>),
}

impl From<PathBuf> for TextureSource {
    fn from(path: PathBuf) -> Self {
        TextureSource::Path(path)
    }
}

impl From<&Path> for TextureSource {
    fn from(path: &Path) -> Self {
        TextureSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for TextureSource {
    fn from(bytes: Vec<u8>) -> Self {
        TextureSource::Bytes(bytes.into())
    }
}

impl From<RgbaImage> for TextureSource {
    fn from(image: RgbaImage) -> Self {
        TextureSource::Image(Arc::new(image))
    }
}

impl TextureSource {
    /// Raw bytes behind this source. Decoded images have no byte form.
    pub async fn fetch_bytes(&self, id: &str) -> Result<Arc<[u8]>> {
        match self {
            TextureSource::Path(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| AtlasError::missing_source(id, format!("{}: {e}", path.display())))?;
                Ok(bytes.into())
            }
            TextureSource::Bytes(bytes) => Ok(Arc::clone(bytes)),
            TextureSource::Image(_) => Err(AtlasError::missing_source(
                id,
                "decoded image has no encoded byte form",
            )),
        }
    }

    /// Fetches and decodes the source into RGBA8.
    pub async fn load_image(&self, id: &str) -> Result<Arc<RgbaImage>> {
        let image = match self {
            TextureSource::Image(image) => Arc::clone(image),
            _ => {
                let bytes = self.fetch_bytes(id).await?;
                let decoded = image::load_from_memory(&bytes)
                    .map_err(|e| AtlasError::missing_source(id, e))?;
                Arc::new(decoded.to_rgba8())
            }
        };

        if image.width() == 0 || image.height() == 0 {
            return Err(AtlasError::missing_source(
                id,
                format!("invalid image dimensions {}x{}", image.width(), image.height()),
            ));
        }
        Ok(image)
    }
}

/// Loads every source concurrently. Results keep the input order; the first
/// failure (in input order) is returned.
pub async fn load_images(sources: &[(TextureId, TextureSource)]) -> Result<Vec<Arc<RgbaImage>>> {
    let start = Instant::now();
    let futures = sources
        .iter()
        .map(|(id, source)| source.load_image(id));
    let results = join_all(futures).await;
    debug!("Finished loading {} images in {:?}", results.len(), start.elapsed());

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn encode_png(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decodes_png_bytes() {
        let image = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]));
        let source = TextureSource::from(encode_png(&image));
        let decoded = futures::executor::block_on(source.load_image("png")).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_garbage_bytes_are_a_missing_source() {
        let source = TextureSource::from(vec![0u8, 1, 2, 3]);
        let err = futures::executor::block_on(source.load_image("junk")).unwrap_err();
        assert!(matches!(err, AtlasError::MissingSourceImage { ref id, .. } if id == "junk"));
    }

    #[tokio::test]
    async fn test_missing_file_is_a_missing_source() {
        let source = TextureSource::from(PathBuf::from("/definitely/not/here.png"));
        let err = source.load_image("ghost").await.unwrap_err();
        assert!(matches!(err, AtlasError::MissingSourceImage { .. }));
    }

    #[tokio::test]
    async fn test_load_images_reads_files_in_order() {
        let dir = std::env::temp_dir().join(format!("atlasforge-source-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.png");
        let b = dir.join("b.png");
        std::fs::write(&a, encode_png(&RgbaImage::new(4, 4))).unwrap();
        std::fs::write(&b, encode_png(&RgbaImage::new(8, 2))).unwrap();

        let sources = vec![
            (TextureId::new("a"), TextureSource::from(a)),
            (TextureId::new("b"), TextureSource::from(b)),
        ];
        let images = load_images(&sources).await.unwrap();
        assert_eq!(images[0].dimensions(), (4, 4));
        assert_eq!(images[1].dimensions(), (8, 2));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
