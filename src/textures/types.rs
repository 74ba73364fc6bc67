// Plain data shared by the cropping, packing and lookup stages.
// Nothing in here touches the GPU.

use std::collections::HashMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub type TextureId = SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point<T = f32> {
    pub x: T,
    pub y: T,
}

impl<T> Point<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

pub type Vec2 = Point<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Hash)]
pub struct Size<T = f32> {
    pub width: T,
    pub height: T,
}

impl<T> Size<T> {
    pub const fn new(width: T, height: T) -> Self {
        Self { width, height }
    }
}

impl Size<u32> {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Normalizes a texel size against a square layer edge.
    pub fn normalized(&self, layer_size: u32) -> Size<f32> {
        Size::new(
            self.width as f32 / layer_size as f32,
            self.height as f32 / layer_size as f32,
        )
    }
}

/// Axis-aligned texel rectangle, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TexelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TexelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(size: Size<u32>) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Rectangle spanning two inclusive corners, as produced by the bounds pass.
    pub fn from_inclusive(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn size(&self) -> Size<u32> {
        Size::new(self.width, self.height)
    }

    pub fn area(&self) -> u64 {
        self.size().area()
    }

    pub fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.width && height <= self.height
    }

    pub fn intersects(&self, other: &TexelRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Where a (possibly cropped) image lives inside one atlas layer.
///
/// `uv_offset + sampled_scale() <= 1` on both axes always holds. `uv_scale` is
/// the uncropped reference size for draw sizing, so `uv_offset + uv_scale` can
/// pass 1 for a cropped image placed near the layer edge. Sample with
/// `sampled_scale()`, never with `uv_scale`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureRegion {
    /// Normalized top-left of the placed texels within the layer.
    pub uv_offset: Vec2,
    /// Normalized size of the uncropped image. Not a sampling bound.
    pub uv_scale: Size,
    /// Normalized size of the texels actually stored in the layer.
    #[serde(default)]
    pub uv_scale_cropped: Option<Size>,
    /// Offset from the original center to the cropped center, in texels
    /// (`left - right`, `bottom - top`). Positive y points up.
    pub draw_offset: Vec2,
    pub original_size: Size<u32>,
    #[serde(default)]
    pub cropped_size: Size<u32>,
    /// Top-left of this tile inside the full source image; zero unless tiled.
    #[serde(default)]
    pub tile_offset: Point<u32>,
}

impl TextureRegion {
    /// The normalized extent actually sampled from the layer.
    pub fn sampled_scale(&self) -> Size {
        self.uv_scale_cropped.unwrap_or(self.uv_scale)
    }

    /// Number of layer texels this region occupies.
    pub fn texel_area(&self) -> u64 {
        if self.cropped_size.is_empty() {
            self.original_size.area()
        } else {
            self.cropped_size.area()
        }
    }
}

/// A `TextureRegion` bound to a layer of the atlas texture array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasCoords {
    #[serde(flatten)]
    pub region: TextureRegion,
    pub atlas_index: u32,
}

impl std::ops::Deref for AtlasCoords {
    type Target = TextureRegion;

    fn deref(&self) -> &TextureRegion {
        &self.region
    }
}

/// Output of the crop/tile stage, waiting to be packed.
#[derive(Debug, Clone)]
pub struct CroppedImage {
    pub image: RgbaImage,
    pub draw_offset: Vec2,
    /// Uncropped size of this image (or of this tile).
    pub original_size: Size<u32>,
    pub tile_offset: Point<u32>,
}

impl CroppedImage {
    pub fn cropped_size(&self) -> Size<u32> {
        Size::new(self.image.width(), self.image.height())
    }
}

/// One packed, rasterized layer ready for upload.
///
/// A tiled texture may put several tiles in the same layer, so each id maps to
/// the tiles it owns here in tile order.
#[derive(Debug, Clone)]
pub struct CpuTextureAtlas {
    pub texture: RgbaImage,
    pub texture_regions: HashMap<TextureId, Vec<TextureRegion>>,
}

impl CpuTextureAtlas {
    pub fn used_pixels(&self) -> u64 {
        self.texture_regions
            .values()
            .flatten()
            .map(TextureRegion::texel_area)
            .sum()
    }
}

/// Pixel and byte totals across the currently allocated layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtlasUsage {
    /// Texels occupied by resident textures.
    pub used: u64,
    /// Texels of allocated layers not occupied by resident textures.
    pub available: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub layers_in_use: u32,
    pub max_layers: u32,
}
