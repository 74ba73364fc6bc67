// Occupancy of one slice of the atlas texture array

use std::collections::HashSet;

use crate::textures::types::TextureId;

#[derive(Debug, Clone, Default)]
pub enum Layer {
    #[default]
    Empty,
    Busy {
        textures: HashSet<TextureId>,
        used_pixels: u64,
    },
}

impl Layer {
    pub fn busy(textures: impl IntoIterator<Item = TextureId>, used_pixels: u64) -> Self {
        Layer::Busy {
            textures: textures.into_iter().collect(),
            used_pixels,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Layer::Empty)
    }

    pub fn allocations(&self) -> usize {
        match self {
            Layer::Empty => 0,
            Layer::Busy { textures, .. } => textures.len(),
        }
    }

    pub fn used_pixels(&self) -> u64 {
        match self {
            Layer::Empty => 0,
            Layer::Busy { used_pixels, .. } => *used_pixels,
        }
    }

    /// Drops `id` and the `pixels` it covered here (all of its tiles in this layer).
    /// Returns true when the layer became empty.
    ///
    /// Space freed inside a busy layer is not reused until the whole layer empties.
    pub fn release(&mut self, id: &str, pixels: u64) -> bool {
        if let Layer::Busy { textures, used_pixels } = self {
            textures.remove(id);
            *used_pixels = used_pixels.saturating_sub(pixels);
            if textures.is_empty() {
                *self = Layer::Empty;
                return true;
            }
        }
        false
    }
}
