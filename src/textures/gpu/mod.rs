pub mod atlas;
pub mod backend;
pub mod context;
pub mod pipelines;
pub mod readback;

pub use atlas::AtlasTextureArray;
pub use backend::{GpuBackend, GpuSource};
pub use context::GpuContext;
