pub mod config;
pub mod geometry;
pub mod pca;
pub mod sorting;
pub mod stats;
pub mod utils;

#[cfg(feature = "python")]
pub mod bindings;
