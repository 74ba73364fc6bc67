use thiserror::Error;

/// Errors surfaced by the atlas pipeline.
///
/// Nothing is retried or swallowed internally: a failing texture fails the
/// bundle load that contains it and the store is left untouched.
#[derive(Debug, Clone, Error)]
pub enum AtlasError {
    /// The packer could not place an image within the configured layer count.
    #[error("atlas capacity exceeded: {needed} layer(s) needed, {free} of {max} free")]
    AtlasCapacityExceeded { needed: usize, free: usize, max: u32 },

    /// Fetching or decoding a source image failed.
    #[error("missing source image for '{id}': {reason}")]
    MissingSourceImage { id: String, reason: String },

    /// Pipeline creation, submission, buffer mapping or readback failed.
    #[error("gpu compute failure: {0}")]
    GpuComputeFailure(String),

    /// A query referenced a texture id that is not currently loaded.
    #[error("texture '{0}' is not loaded by any bundle")]
    InvalidBundleReference(String),

    /// The renderer attempted to draw a texture id absent from the coordinate store.
    #[error("attempted to draw unregistered texture '{0}'")]
    UnregisteredTextureDraw(String),

    #[error("bundle '{0}' is not registered")]
    UnknownBundle(String),

    #[error("bundle '{0}' is already registered")]
    DuplicateBundle(String),

    #[error("invalid prebaked atlas: {0}")]
    InvalidPrebakedAtlas(String),

    #[error("image {width}x{height} does not fit a {layer_size}x{layer_size} atlas layer")]
    ImageTooLarge { width: u32, height: u32, layer_size: u32 },

    #[error("settings error: {0}")]
    Settings(String),
}

impl AtlasError {
    pub fn missing_source(id: &str, reason: impl ToString) -> Self {
        AtlasError::MissingSourceImage {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn gpu(reason: impl ToString) -> Self {
        AtlasError::GpuComputeFailure(reason.to_string())
    }
}

pub type Result<T, E = AtlasError> = std::result::Result<T, E>;
