use super::{ChainMode, ImgRecogEngine};
use crate::error::RecogResult;
use crate::geometry::{Point, Rect, Size};
use crate::locator::LocatorSpec;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

/// An element located on screen, in window coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedElement {
    rect: Rect,
    locators: Vec<LocatorSpec>,
    score: f64,
}

impl ResolvedElement {
    pub fn new(rect: Rect, locators: Vec<LocatorSpec>, score: f64) -> Self {
        Self {
            rect,
            locators,
            score,
        }
    }

    pub fn centre(&self) -> Point {
        self.rect.center()
    }

    pub fn location(&self) -> Point {
        self.rect.location()
    }

    pub fn size(&self) -> Size {
        Size::new(self.rect.width.max(0) as u32, self.rect.height.max(0) as u32)
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Score of the last matcher that ran; only comparable within one method.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// The specs that led to this element, in evaluation order.
    pub fn locators(&self) -> &[LocatorSpec] {
        &self.locators
    }

    /// A resolved element was seen on the screenshot it was resolved from.
    pub fn is_displayed(&self) -> bool {
        true
    }

    /// Whether the element's region reads as blank. OCR failures are returned as errors.
    pub fn is_text_empty(
        &self,
        engine: &ImgRecogEngine,
        screenshot: &DynamicImage,
    ) -> RecogResult<bool> {
        Ok(engine.recognise(screenshot, self.rect)?.is_empty())
    }

    pub(crate) fn with_locators(self, locators: Vec<LocatorSpec>) -> Self {
        Self { locators, ..self }
    }
}

type Capture<'e> = Box<dyn Fn() -> RecogResult<DynamicImage> + 'e>;

/// A handle that locates its element on first access and keeps the result.
///
/// A failed attempt is not cached, the next access tries again with a fresh capture.
pub struct LazyElement<'e> {
    engine: &'e ImgRecogEngine,
    specs: Vec<LocatorSpec>,
    mode: ChainMode,
    capture: Capture<'e>,
    resolved: OnceCell<Option<ResolvedElement>>,
}

impl<'e> LazyElement<'e> {
    pub fn new<F>(
        engine: &'e ImgRecogEngine,
        specs: Vec<LocatorSpec>,
        mode: ChainMode,
        capture: F,
    ) -> Self
    where
        F: Fn() -> RecogResult<DynamicImage> + 'e,
    {
        Self {
            engine,
            specs,
            mode,
            capture: Box::new(capture),
            resolved: OnceCell::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The located element, or `None` when the screenshot did not contain it.
    pub fn get(&self) -> RecogResult<Option<&ResolvedElement>> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.as_ref());
        }
        let screenshot = (self.capture)()?;
        let found = self
            .engine
            .find_element_chain(&self.specs, &screenshot, self.mode)?;
        log::debug!(
            "Lazy element resolved on first access: {:?}",
            found.as_ref().map(|e| e.rect())
        );
        Ok(self.resolved.get_or_init(|| found).as_ref())
    }

    pub fn locators(&self) -> &[LocatorSpec] {
        &self.specs
    }
}
