// Transparent-border cropping of a source image, tile by tile.
//
// Bounds for every tile are read back before any crop is dispatched; the crop
// rectangle is a data dependency on the detection output. Each tile is uploaded
// as its own source.

use std::sync::Arc;

use image::{imageops, Rgba, RgbaImage};

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::config::{CHECKER_COLOR_OFF, CHECKER_COLOR_ON, CHECKER_TILE_SIZE};
use crate::error::{AtlasError, Result};
use crate::textures::backend::TextureBackend;
use crate::textures::tiler;
use crate::textures::types::{CroppedImage, Point, Size, TexelRect, Vec2};

/// Offset that keeps `bounds` drawn where it sat inside `frame`.
///
/// `x = leftCrop - rightCrop`, `y = bottomCrop - topCrop`.
pub fn draw_offset(frame: Size<u32>, bounds: TexelRect) -> Vec2 {
    let left = bounds.x as f32;
    let right = frame.width as f32 - bounds.right() as f32;
    let top = bounds.y as f32;
    let bottom = frame.height as f32 - bounds.bottom() as f32;

    Vec2::new(left - right, bottom - top)
}

/// Placeholder texel at `(x, y)`; matches the `missing_texture` kernel.
pub fn checker_color(x: u32, y: u32) -> Rgba<u8> {
    let on = (x / CHECKER_TILE_SIZE + y / CHECKER_TILE_SIZE) % 2 == 0;
    Rgba(if on { CHECKER_COLOR_ON } else { CHECKER_COLOR_OFF })
}

pub fn checkerboard(size: Size<u32>) -> RgbaImage {
    RgbaImage::from_fn(size.width, size.height, checker_color)
}

/// Turns one decoded image into the images the packer places, in tile order.
///
/// Images wider or taller than `max_size` are split into tiles on the host
/// first, so the backend never sees more than one layer's worth of texels. With
/// `crop_transparent_pixels`, each tile is trimmed to its opaque bounds; an
/// image with no opaque texel at all becomes the checkerboard placeholder.
pub async fn process_image<B: TextureBackend>(
    backend: &B,
    id: &str,
    image: Arc<RgbaImage>,
    crop_transparent_pixels: bool,
    max_size: u32,
) -> Result<Vec<CroppedImage>> {
    let frame = Size::new(image.width(), image.height());
    if frame.is_empty() {
        return Err(AtlasError::missing_source(id, "image has no texels"));
    }
    if max_size == 0 {
        return Err(AtlasError::Settings(format!("cannot place '{}' in a layer of size 0", id)));
    }

    let tiles = tiler::tiles_for(frame, max_size);
    if tiles.len() > 1 {
        debug!("Tiling '{}' ({}x{}) into {} tiles", id, frame.width, frame.height, tiles.len());
    }

    let slices: Vec<Arc<RgbaImage>> = if tiles.len() == 1 {
        vec![image]
    } else {
        tiles
            .iter()
            .map(|tile| Arc::new(imageops::crop_imm(image.as_ref(), tile.x, tile.y, tile.width, tile.height).to_image()))
            .collect()
    };

    if !crop_transparent_pixels {
        return Ok(tiles
            .into_iter()
            .zip(slices)
            .map(|(tile, slice)| CroppedImage {
                image: Arc::try_unwrap(slice).unwrap_or_else(|shared| shared.as_ref().clone()),
                draw_offset: draw_offset(frame, tile),
                original_size: tile.size(),
                tile_offset: Point::new(tile.x, tile.y),
            })
            .collect());
    }

    // Bounds are in tile-local texels.
    let mut scanned = Vec::with_capacity(tiles.len());
    for (tile, slice) in tiles.iter().zip(&slices) {
        let source = backend.prepare_source(slice).await?;
        let bounds = backend
            .find_opaque_bounds(&source, TexelRect::from_size(tile.size()))
            .await?;
        scanned.push((source, bounds));
    }

    let mut output = Vec::with_capacity(tiles.len());

    if scanned.iter().all(|(_, bounds)| bounds.is_none()) {
        drop(scanned);
        warn!("'{}' has no opaque pixels, using the missing texture placeholder", id);
        for tile in tiles {
            output.push(CroppedImage {
                image: backend.missing_texture(tile.size()).await?,
                draw_offset: draw_offset(frame, tile),
                original_size: tile.size(),
                tile_offset: Point::new(tile.x, tile.y),
            });
        }
        return Ok(output);
    }

    for (tile, (source, bounds)) in tiles.into_iter().zip(scanned) {
        // Empty tiles of a partly opaque image stay transparent and uncropped.
        let local = bounds.unwrap_or_else(|| TexelRect::from_size(tile.size()));
        let keep = TexelRect::new(tile.x + local.x, tile.y + local.y, local.width, local.height);
        output.push(CroppedImage {
            image: backend.crop(&source, local).await?,
            draw_offset: draw_offset(frame, keep),
            original_size: tile.size(),
            tile_offset: Point::new(tile.x, tile.y),
        });
    }

    Ok(output)
}
