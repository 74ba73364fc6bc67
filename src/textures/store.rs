use std::collections::HashMap;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::config::BYTES_PER_PIXEL;
use crate::error::{AtlasError, Result};
use crate::textures::types::{AtlasCoords, AtlasUsage, Size, TextureId, Vec2};

/// Everything known about one resident texture.
#[derive(Debug, Clone)]
pub struct TextureEntry {
    /// One placement per tile, in tile order. Never empty.
    pub coords: Vec<AtlasCoords>,
    /// Size of the full source image.
    pub size: Size<u32>,
}

impl TextureEntry {
    pub fn used_pixels(&self) -> u64 {
        self.coords.iter().map(|c| c.texel_area()).sum()
    }
}

/// Texture id -> atlas placements. Entries live until explicitly removed.
#[derive(Debug, Default)]
pub struct AtlasCoordinateStore {
    entries: HashMap<TextureId, TextureEntry>,
}

impl AtlasCoordinateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the placements for `id`, replacing any previous ones.
    pub fn set(&mut self, id: TextureId, coords: Vec<AtlasCoords>, size: Size<u32>) {
        debug_assert!(!coords.is_empty(), "texture '{id}' stored without placements");
        self.entries.insert(id, TextureEntry { coords, size });
    }

    pub fn get(&self, id: &str) -> Result<&[AtlasCoords]> {
        self.entry(id).map(|entry| entry.coords.as_slice())
    }

    pub fn entry(&self, id: &str) -> Result<&TextureEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| AtlasError::InvalidBundleReference(id.to_string()))
    }

    pub fn size(&self, id: &str) -> Result<Size<u32>> {
        self.entry(id).map(|entry| entry.size)
    }

    /// Draw offset of the texture; for tiled textures, that of the first tile.
    pub fn draw_offset(&self, id: &str) -> Result<Vec2> {
        self.entry(id).map(|entry| entry.coords[0].draw_offset)
    }

    pub fn remove(&mut self, id: &str) -> Option<TextureEntry> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TextureId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn used_pixels(&self) -> u64 {
        self.entries.values().map(TextureEntry::used_pixels).sum()
    }

    /// Usage across `layers_in_use` allocated layers of `layer_size` squared texels.
    pub fn usage(&self, layer_size: u32, layers_in_use: u32, max_layers: u32) -> AtlasUsage {
        let capacity = layer_size as u64 * layer_size as u64 * layers_in_use as u64;
        let used = self.used_pixels();
        let available = capacity.saturating_sub(used);

        AtlasUsage {
            used,
            available,
            used_bytes: used * BYTES_PER_PIXEL as u64,
            available_bytes: available * BYTES_PER_PIXEL as u64,
            layers_in_use,
            max_layers,
        }
    }
}
