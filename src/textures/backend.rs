use std::sync::Arc;

use image::RgbaImage;

use crate::error::Result;
use crate::textures::types::{CpuTextureAtlas, Size, TexelRect};

/// Device seam for the bounds/crop/placeholder passes and for atlas layer storage.
///
/// The async passes take `&self` so independent textures can be in flight at the
/// same time; layer writes take `&mut self` and only happen from the single
/// control flow that owns the `AssetStore`.
#[allow(async_fn_in_trait)]
pub trait TextureBackend {
    /// A source image made resident for the passes below. Dropping it frees any
    /// device resources it holds.
    type Source;

    /// Uploads `image`. Callers never pass anything larger than one atlas layer.
    async fn prepare_source(&self, image: &Arc<RgbaImage>) -> Result<Self::Source>;

    /// Bounding box of texels with alpha > 0 inside `area`, in source texel space.
    /// `None` when every texel in `area` is fully transparent.
    async fn find_opaque_bounds(&self, source: &Self::Source, area: TexelRect) -> Result<Option<TexelRect>>;

    /// Copies `bounds` of the source into a new image of exactly that size.
    async fn crop(&self, source: &Self::Source, bounds: TexelRect) -> Result<RgbaImage>;

    /// The checkerboard placeholder for images with no opaque texels.
    async fn missing_texture(&self, size: Size<u32>) -> Result<RgbaImage>;

    /// Stores a packed layer at `index` of the atlas array, growing it if needed.
    fn write_layer(&mut self, index: u32, atlas: &CpuTextureAtlas) -> Result<()>;

    /// Marks the layer at `index` as unused.
    fn release_layer(&mut self, index: u32);
}
