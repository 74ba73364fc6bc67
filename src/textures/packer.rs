// Guillotine bin packing of cropped images into fixed-size square layers.
//
// Placement is computed for the whole batch first so capacity can be checked
// before any layer is rasterized.

use std::collections::HashMap;

use image::RgbaImage;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::error::{AtlasError, Result};
use crate::textures::types::{CpuTextureAtlas, CroppedImage, TexelRect, TextureId, TextureRegion};

/// Free-rectangle list of one open layer.
#[derive(Debug, Clone)]
pub struct GuillotinePacker {
    size: u32,
    spaces: Vec<TexelRect>,
}

impl GuillotinePacker {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            spaces: vec![TexelRect::new(0, 0, size, size)],
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn free_spaces(&self) -> &[TexelRect] {
        &self.spaces
    }

    /// Index of the free rectangle whose area is closest to the image's.
    /// The first rectangle with the minimal score wins.
    fn best_space(&self, width: u32, height: u32) -> Option<usize> {
        let area = width as u64 * height as u64;
        let mut best: Option<(usize, u64)> = None;

        for (i, space) in self.spaces.iter().enumerate() {
            if !space.fits(width, height) {
                continue;
            }
            let score = space.area().abs_diff(area);
            if best.map_or(true, |(_, best_score)| score < best_score) {
                best = Some((i, score));
            }
        }

        best.map(|(i, _)| i)
    }

    /// Places a `width` x `height` image, or `None` when no free rectangle holds it.
    pub fn insert(&mut self, width: u32, height: u32) -> Option<TexelRect> {
        let index = self.best_space(width, height)?;
        let space = self.spaces.remove(index);

        if space.width > width {
            self.spaces.push(TexelRect::new(
                space.x + width,
                space.y,
                space.width - width,
                height,
            ));
        }

        if space.height > height {
            self.spaces.push(TexelRect::new(
                space.x,
                space.y + height,
                space.width,
                space.height - height,
            ));
        }

        Some(TexelRect::new(space.x, space.y, width, height))
    }
}

/// Where one input image ended up.
#[derive(Debug, Clone)]
pub struct Placement {
    pub id: TextureId,
    /// Index into `PackedAtlases::atlases`, not yet an array layer.
    pub layer: usize,
    pub rect: TexelRect,
    pub region: TextureRegion,
}

#[derive(Debug, Clone)]
pub struct PackedAtlases {
    pub atlases: Vec<CpuTextureAtlas>,
    /// One entry per input image, in input order.
    pub placements: Vec<Placement>,
}

fn region_for(image: &CroppedImage, rect: TexelRect, size: u32) -> TextureRegion {
    let s = size as f32;
    TextureRegion {
        uv_offset: crate::textures::types::Vec2::new(rect.x as f32 / s, rect.y as f32 / s),
        uv_scale: image.original_size.normalized(size),
        uv_scale_cropped: Some(image.cropped_size().normalized(size)),
        draw_offset: image.draw_offset,
        original_size: image.original_size,
        cropped_size: image.cropped_size(),
        tile_offset: image.tile_offset,
    }
}

/// Computes placements for `images` in order, opening a new layer whenever the
/// current one cannot hold the next image.
pub fn place_images(images: &[(TextureId, CroppedImage)], size: u32) -> Result<Vec<Placement>> {
    let mut packer = GuillotinePacker::new(size);
    let mut layer = 0;
    let mut layer_used = false;
    let mut placements = Vec::with_capacity(images.len());

    for (id, image) in images {
        let (width, height) = image.image.dimensions();
        if width > size || height > size {
            return Err(AtlasError::ImageTooLarge { width, height, layer_size: size });
        }

        let rect = match packer.insert(width, height) {
            Some(rect) => rect,
            None => {
                if layer_used {
                    layer += 1;
                }
                packer = GuillotinePacker::new(size);
                packer
                    .insert(width, height)
                    .ok_or(AtlasError::ImageTooLarge { width, height, layer_size: size })?
            }
        };
        layer_used = true;

        placements.push(Placement {
            id: id.clone(),
            layer,
            rect,
            region: region_for(image, rect, size),
        });
    }

    Ok(placements)
}

/// Packs `images` into at most `max_layers` layers and rasterizes each layer.
pub fn pack_images(
    images: &[(TextureId, CroppedImage)],
    size: u32,
    max_layers: usize,
    max_total: u32,
) -> Result<PackedAtlases> {
    let placements = place_images(images, size)?;
    let needed = placements.last().map_or(0, |p| p.layer + 1);

    if needed > max_layers {
        return Err(AtlasError::AtlasCapacityExceeded {
            needed,
            free: max_layers,
            max: max_total,
        });
    }

    let mut atlases: Vec<CpuTextureAtlas> = (0..needed)
        .map(|_| CpuTextureAtlas {
            texture: RgbaImage::new(size, size),
            texture_regions: HashMap::new(),
        })
        .collect();

    for (placement, (_, image)) in placements.iter().zip(images) {
        let atlas = &mut atlases[placement.layer];
        image::imageops::replace(
            &mut atlas.texture,
            &image.image,
            placement.rect.x as i64,
            placement.rect.y as i64,
        );
        atlas
            .texture_regions
            .entry(placement.id.clone())
            .or_default()
            .push(placement.region);
    }

    debug!("Packed {} images into {} layer(s) of {}x{}", images.len(), needed, size, size);

    Ok(PackedAtlases { atlases, placements })
}
