//! Atlas Module
//!
//! Per-category atlases kept in sync with the scene.

pub mod coordinator;

pub use coordinator::{AtlasCoordinator, PackerErrorCallback, ParseReport};
