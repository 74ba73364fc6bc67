use crate::textures::prebaked::PrebakedAtlas;
use crate::textures::source::TextureSource;
use crate::textures::types::TextureId;

/// Lifecycle of a registered bundle.
///
/// `Registered -> Loading -> Loaded -> Unloaded`, with `Loaded -> Loading` on
/// reload and `Unloaded -> Loading` on a later load. A failed load falls back
/// to the state the bundle had before it (or `Unloaded` after a reload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BundleState {
    #[default]
    Registered,
    Loading,
    Loaded,
    Unloaded,
}

/// What a bundle contains and how its textures are prepared.
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    /// Source images, packed in this order.
    pub textures: Vec<(TextureId, TextureSource)>,
    /// Layers packed ahead of time, uploaded verbatim.
    pub atlases: Vec<PrebakedAtlas>,
    /// Trim fully transparent borders before packing.
    pub crop_transparent_pixels: bool,
    /// Load as part of registration.
    pub auto_load: bool,
}

impl BundleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(mut self, id: impl Into<TextureId>, source: impl Into<TextureSource>) -> Self {
        self.textures.push((id.into(), source.into()));
        self
    }

    pub fn atlas(mut self, atlas: PrebakedAtlas) -> Self {
        self.atlases.push(atlas);
        self
    }

    pub fn crop_transparent_pixels(mut self, crop: bool) -> Self {
        self.crop_transparent_pixels = crop;
        self
    }

    pub fn auto_load(mut self, auto_load: bool) -> Self {
        self.auto_load = auto_load;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub name: String,
    pub options: BundleOptions,
    pub state: BundleState,
    /// Ids this bundle holds a reference on while loaded.
    pub(crate) resident: Vec<TextureId>,
}

impl Bundle {
    pub fn new(name: &str, options: BundleOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            state: BundleState::Registered,
            resident: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state == BundleState::Loaded
    }

    /// Texture ids this bundle makes resolvable once loaded.
    pub fn texture_ids(&self) -> &[TextureId] {
        &self.resident
    }
}
