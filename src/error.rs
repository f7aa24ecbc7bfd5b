use crate::geometry::{Rect, Size};
use thiserror::Error;

/// Boxed error produced by an external vision capability.
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized `Result` type for image recognition operations.
pub type RecogResult<T> = Result<T, RecogError>;

/// The error type for all image recognition operations.
///
/// "Not found" is never an error: lookups return `Ok(None)` or an empty list.
#[derive(Debug, Error)]
pub enum RecogError {
    #[error("Invalid locator parameter '{field}': {reason}")]
    Configuration { field: &'static str, reason: String },

    #[error("Image is empty or unreadable: {description}")]
    EmptyImage { description: String },

    #[error(
        "Rectangle (x={}, y={}, w={}, h={}) does not fit inside {}x{} even after clamping",
        rect.x, rect.y, rect.width, rect.height, bounds.width, bounds.height
    )]
    Boundary { rect: Rect, bounds: Size },

    #[error(
        "The '{method}' method cannot be used to find lists of elements, only single elements"
    )]
    UnsupportedFindAll { method: &'static str },

    #[error("{capability} capability failed: {source}")]
    Capability {
        capability: &'static str,
        source: CapabilityError,
    },

    #[error("Image decoding failed: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },
}

impl RecogError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        RecogError::Configuration {
            field,
            reason: reason.into(),
        }
    }

    pub fn empty_image(description: impl Into<String>) -> Self {
        RecogError::EmptyImage {
            description: description.into(),
        }
    }

    /// Wrap a failure reported by one of the external capabilities.
    pub fn capability(capability: &'static str, source: impl Into<CapabilityError>) -> Self {
        RecogError::Capability {
            capability,
            source: source.into(),
        }
    }

    /// Whether the error was raised by parameter validation, before any image work.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RecogError::Configuration { .. })
    }
}
