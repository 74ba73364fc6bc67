pub mod bundle;
pub mod store;

pub use bundle::{Bundle, BundleOptions, BundleState};
pub use store::AssetStore;
