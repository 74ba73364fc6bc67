// Atlases packed ahead of time: a layer image plus a JSON map of id -> region.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::RgbaImage;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::error::{AtlasError, Result};
use crate::textures::source::TextureSource;
use crate::textures::types::{CpuTextureAtlas, TextureId, TextureRegion};

const UV_TOLERANCE: f32 = 1e-4;

/// One prebaked layer: the region table and the layer image.
#[derive(Debug, Clone)]
pub struct PrebakedAtlas {
    pub json: TextureSource,
    pub png: TextureSource,
}

impl PrebakedAtlas {
    pub fn new(json: impl Into<TextureSource>, png: impl Into<TextureSource>) -> Self {
        Self {
            json: json.into(),
            png: png.into(),
        }
    }
}

/// Parses the region table. Ids come back sorted so layouts are reproducible.
pub fn parse_regions(json: &[u8]) -> Result<Vec<(TextureId, TextureRegion)>> {
    let table: BTreeMap<String, TextureRegion> = serde_json::from_slice(json)
        .map_err(|e| AtlasError::InvalidPrebakedAtlas(e.to_string()))?;

    table
        .into_iter()
        .map(|(id, mut region)| {
            if region.cropped_size.is_empty() {
                region.cropped_size = region.original_size;
            }
            validate_region(&id, &region)?;
            Ok((TextureId::from(id), region))
        })
        .collect()
}

fn validate_region(id: &str, region: &TextureRegion) -> Result<()> {
    let scale = region.sampled_scale();
    let in_bounds = region.uv_offset.x >= 0.0
        && region.uv_offset.y >= 0.0
        && region.uv_offset.x + scale.width <= 1.0 + UV_TOLERANCE
        && region.uv_offset.y + scale.height <= 1.0 + UV_TOLERANCE;

    if !in_bounds {
        return Err(AtlasError::InvalidPrebakedAtlas(format!(
            "region '{id}' leaves the layer: offset {:?}, scale {:?}",
            region.uv_offset, scale
        )));
    }
    Ok(())
}

/// Fetches both halves of a prebaked atlas and builds the layer to upload.
/// Images smaller than the layer are placed at the top-left.
pub async fn load_prebaked(atlas: &PrebakedAtlas, label: &str, layer_size: u32) -> Result<CpuTextureAtlas> {
    let json = atlas.json.fetch_bytes(label).await?;
    let regions = parse_regions(&json)?;
    let image: Arc<RgbaImage> = atlas.png.load_image(label).await?;

    if image.width() > layer_size || image.height() > layer_size {
        return Err(AtlasError::InvalidPrebakedAtlas(format!(
            "'{label}' is {}x{}, larger than the {layer_size}x{layer_size} layer",
            image.width(),
            image.height()
        )));
    }

    let texture = if image.width() == layer_size && image.height() == layer_size {
        image.as_ref().clone()
    } else {
        let mut texture = RgbaImage::new(layer_size, layer_size);
        image::imageops::replace(&mut texture, image.as_ref(), 0, 0);
        texture
    };

    let mut texture_regions = std::collections::HashMap::new();
    for (id, region) in regions {
        texture_regions.insert(id, vec![region]);
    }
    debug!("Loaded prebaked atlas '{}' with {} regions", label, texture_regions.len());

    Ok(CpuTextureAtlas { texture, texture_regions })
}
