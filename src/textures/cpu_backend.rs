// Host-side implementation of the texture passes.
// Same contract as the compute kernels; used headless and as the reference in tests.

use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::error::{AtlasError, Result};
use crate::textures::backend::TextureBackend;
use crate::textures::cropping::checkerboard;
use crate::textures::types::{CpuTextureAtlas, Size, TexelRect};

/// Keeps uploaded layers in memory as plain images.
#[derive(Debug, Default)]
pub struct CpuBackend {
    layers: Vec<Option<RgbaImage>>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored layer at `index`, if one has been written and not released.
    pub fn layer(&self, index: u32) -> Option<&RgbaImage> {
        self.layers.get(index as usize).and_then(Option::as_ref)
    }

    pub fn resident_layers(&self) -> usize {
        self.layers.iter().filter(|layer| layer.is_some()).count()
    }
}

/// Inclusive min/max accumulator, the host twin of the atomic bounds buffer.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Accumulator {
    const UNSET: Self = Self {
        min_x: u32::MAX,
        min_y: u32::MAX,
        max_x: 0,
        max_y: 0,
    };

    fn merge(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    fn into_rect(self) -> Option<TexelRect> {
        if self.min_x == u32::MAX || self.min_y == u32::MAX {
            return None;
        }
        Some(TexelRect::from_inclusive(self.min_x, self.min_y, self.max_x, self.max_y))
    }
}

fn check_area(image: &RgbaImage, area: TexelRect) -> Result<()> {
    if area.right() > image.width() || area.bottom() > image.height() {
        return Err(AtlasError::gpu(format!(
            "area {:?} exceeds source {}x{}",
            area,
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

impl TextureBackend for CpuBackend {
    type Source = Arc<RgbaImage>;

    async fn prepare_source(&self, image: &Arc<RgbaImage>) -> Result<Self::Source> {
        Ok(Arc::clone(image))
    }

    async fn find_opaque_bounds(&self, source: &Self::Source, area: TexelRect) -> Result<Option<TexelRect>> {
        check_area(source, area)?;

        let bounds = (area.y..area.bottom())
            .into_par_iter()
            .filter_map(|y| {
                let row = (area.x..area.right()).filter(|&x| source.get_pixel(x, y)[3] > 0);
                let mut row = row.peekable();
                let first = *row.peek()?;
                let last = row.last().unwrap_or(first);
                Some(Accumulator {
                    min_x: first,
                    min_y: y,
                    max_x: last,
                    max_y: y,
                })
            })
            .reduce(|| Accumulator::UNSET, Accumulator::merge);

        Ok(bounds.into_rect())
    }

    async fn crop(&self, source: &Self::Source, bounds: TexelRect) -> Result<RgbaImage> {
        check_area(source, bounds)?;
        Ok(image::imageops::crop_imm(source.as_ref(), bounds.x, bounds.y, bounds.width, bounds.height).to_image())
    }

    async fn missing_texture(&self, size: Size<u32>) -> Result<RgbaImage> {
        Ok(checkerboard(size))
    }

    fn write_layer(&mut self, index: u32, atlas: &CpuTextureAtlas) -> Result<()> {
        let index = index as usize;
        if self.layers.len() <= index {
            self.layers.resize_with(index + 1, || None);
        }
        debug!("Storing layer {} ({} textures)", index, atlas.texture_regions.len());
        self.layers[index] = Some(atlas.texture.clone());
        Ok(())
    }

    fn release_layer(&mut self, index: u32) {
        if let Some(layer) = self.layers.get_mut(index as usize) {
            *layer = None;
        }
    }
}
