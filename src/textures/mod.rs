pub mod backend;
pub mod cpu_backend;
pub mod cropping;
pub mod gpu;
pub mod layer;
pub mod packer;
pub mod prebaked;
pub mod source;
pub mod store;
pub mod tiler;
pub mod types;

pub use backend::TextureBackend;
pub use cpu_backend::CpuBackend;
pub use prebaked::PrebakedAtlas;
pub use source::TextureSource;
pub use store::AtlasCoordinateStore;
pub use types::{AtlasCoords, AtlasUsage, CpuTextureAtlas, Size, TextureId, TextureRegion, Vec2};
