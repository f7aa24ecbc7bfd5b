//! Once-initialised handle for capabilities that are expensive to build

use super::{OcrEngine, Recognition, TextDetector, TextDetectorOutput};
use crate::error::{CapabilityError, RecogError, RecogResult};
use crate::geometry::{Rect, Size};
use image::DynamicImage;
use std::sync::{Mutex, OnceLock};

type Factory<T> = Box<dyn Fn() -> Result<T, CapabilityError> + Send + Sync>;

/// Builds its value on first use and hands out shared references afterwards.
///
/// The factory runs at most once successfully; concurrent first callers wait on the
/// initialisation lock instead of building twice. A failed build is reported to the caller
/// that triggered it and retried on the next access.
pub struct SharedCapability<T> {
    name: &'static str,
    cell: OnceLock<T>,
    init_lock: Mutex<()>,
    factory: Factory<T>,
}

impl<T: Send + Sync> SharedCapability<T> {
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> Result<T, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            name,
            cell: OnceLock::new(),
            init_lock: Mutex::new(()),
            factory: Box::new(factory),
        }
    }

    /// A handle that is already initialised.
    pub fn ready(name: &'static str, value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self {
            name,
            cell,
            init_lock: Mutex::new(()),
            factory: Box::new(move || Err(format!("{name} was provided pre-built").into())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> RecogResult<&T> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        log::info!("Initialising {}", self.name);
        let value = (self.factory)().map_err(|e| RecogError::capability(self.name, e))?;
        Ok(self.cell.get_or_init(|| value))
    }
}

fn boxed(err: RecogError) -> CapabilityError {
    Box::new(err)
}

impl<T: TextDetector> TextDetector for SharedCapability<T> {
    fn input_size(&self) -> Result<Size, CapabilityError> {
        self.get().map_err(boxed)?.input_size()
    }

    fn forward(&self, image: &DynamicImage) -> Result<TextDetectorOutput, CapabilityError> {
        self.get().map_err(boxed)?.forward(image)
    }
}

impl<T: OcrEngine> OcrEngine for SharedCapability<T> {
    fn recognize(&self, image: &DynamicImage, rect: Rect) -> Result<Recognition, CapabilityError> {
        self.get().map_err(boxed)?.recognize(image, rect)
    }
}
