//! Texture atlas pipeline for 2D GPU renderers.
//!
//! Source images are cropped to their opaque bounds (or replaced by a
//! checkerboard when fully transparent), split into tiles when larger than a
//! layer, packed into fixed-size layers with a guillotine packer and uploaded
//! into one texture array. [`AssetStore`] drives all of it per named bundle and
//! answers the renderer's coordinate queries.

pub mod assets;
pub mod config;
pub mod error;
pub mod logging;
pub mod settings;
pub mod textures;
pub mod utils;

pub use assets::{AssetStore, Bundle, BundleOptions, BundleState};
pub use config::Limits;
pub use error::{AtlasError, Result};
pub use settings::AtlasSettings;
pub use textures::gpu::{GpuBackend, GpuContext};
pub use textures::{
    AtlasCoords, AtlasUsage, CpuBackend, CpuTextureAtlas, PrebakedAtlas, Size, TextureBackend,
    TextureId, TextureRegion, TextureSource, Vec2,
};
