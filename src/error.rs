//! Error handling for lod-atlas
//!
//! A single error type covers argument validation, compute backend
//! availability, scene discovery and packing overflow. Estimator failures are
//! recoverable: callers fall back to native texture sizes.

use thiserror::Error;

/// Main error type for lod-atlas
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Zero or negative counts, out-of-range ids, non-positive sizes
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// The backend cannot run the parallel reduction (no compute support,
    /// shader failed to compile, or its entry point is missing)
    #[error("Compute unsupported: {0}")]
    ComputeUnsupported(String),

    /// A category yields no bindings after filtering
    #[error("No suitable textures found for category {category}")]
    NoSuitableTextures { category: String },

    /// No repack fits within the maximum atlas size
    #[error("Packing overflow in atlas {category}: {unfit} of {total} textures did not fit in {max_size}x{max_size}")]
    PackingOverflow {
        category: String,
        unfit: usize,
        total: usize,
        max_size: u32,
    },

    #[error("Resource not found: {resource_type} '{id}'")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("GPU operation '{operation}' failed: {error}")]
    GpuOperationFailed { operation: String, error: String },
}

/// Type alias for Results in lod-atlas
pub type AtlasResult<T> = Result<T, AtlasError>;

impl AtlasError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        AtlasError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// True for failures that should degrade to native sizes instead of aborting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AtlasError::ComputeUnsupported(_)
                | AtlasError::NoSuitableTextures { .. }
                | AtlasError::GpuOperationFailed { .. }
        )
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_atlas<F>(self, f: F) -> AtlasResult<T>
    where
        F: FnOnce() -> AtlasError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_atlas<F>(self, f: F) -> AtlasResult<T>
    where
        F: FnOnce() -> AtlasError,
    {
        self.ok_or_else(f)
    }
}
