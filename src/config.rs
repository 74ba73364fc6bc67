// Default values for configuration
// These mirror the engine limits and serve as fallbacks for the settings file

use crate::error::{AtlasError, Result};

/// Maximum dimensions of a single atlas layer (and of a single texture tile).
pub const DEFAULT_TEXTURE_SIZE: u32 = 1024 * 4;
/// Maximum number of layers in the atlas texture array.
pub const DEFAULT_TEXTURE_ARRAY_LAYERS: u32 = 64;
/// Edge length in texels of one square of the missing-texture checkerboard.
pub const CHECKER_TILE_SIZE: u32 = 25;
/// Compute workgroup edge, must match `@workgroup_size(8, 8)` in the shaders.
pub const WORKGROUP_SIZE: u32 = 8;
pub const BYTES_PER_PIXEL: u32 = 4;

/// Checkerboard colors as RGBA8: green where `(x / tile + y / tile)` is even, purple elsewhere.
pub const CHECKER_COLOR_ON: [u8; 4] = [0, 255, 0, 255];
pub const CHECKER_COLOR_OFF: [u8; 4] = [128, 0, 128, 255];

/// Runtime limits of one `AssetStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub texture_size: u32,               // Edge length of a square atlas layer
    pub texture_array_layers: u32,       // Max layers before AtlasCapacityExceeded
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            texture_size: DEFAULT_TEXTURE_SIZE,
            texture_array_layers: DEFAULT_TEXTURE_ARRAY_LAYERS,
        }
    }
}

impl Limits {
    pub fn new(texture_size: u32, texture_array_layers: u32) -> Self {
        Self { texture_size, texture_array_layers }
    }

    pub fn layer_pixels(&self) -> u64 {
        self.texture_size as u64 * self.texture_size as u64
    }

    /// The maximum number of pixels that can be resident across all layers.
    pub fn max_pixels(&self) -> u64 {
        self.layer_pixels() * self.texture_array_layers as u64
    }

    /// Both limits must be at least 1.
    pub fn validate(&self) -> Result<()> {
        if self.texture_size == 0 {
            return Err(AtlasError::Settings("texture_size must be at least 1".to_string()));
        }
        if self.texture_array_layers == 0 {
            return Err(AtlasError::Settings("texture_array_layers must be at least 1".to_string()));
        }
        Ok(())
    }
}
