//! Element location engine
//!
//! Ties a [`LocatorSpec`] to the matcher its method names, runs it on the requested region
//! of a screenshot and maps the result back onto the device screen.

pub mod chain;
pub mod element;
pub mod reconcile;

#[cfg(test)]
mod tests;

pub use chain::ChainMode;
pub use element::{LazyElement, ResolvedElement};
pub use reconcile::{ScreenProfile, SystemBars, correct_for_screen, reconcile, reverse_cutout};

use crate::capability::{
    FeatureDetector, HomographyEstimator, NccCorrelator, OcrEngine, TemplateCorrelator,
    TextDetector,
};
use crate::error::{RecogError, RecogResult};
use crate::geometry::{Rect, Size, cutout, to_absolute};
use crate::locator::{LocatorSpec, Method, TemplateSource};
use crate::matching::{FeatureMatcher, MatchCandidate, TemplateMatcher, TextPipeline};
use image::DynamicImage;
use std::borrow::Cow;
use std::sync::Arc;

/// Locates elements in screenshots with the capabilities it was built with.
///
/// Template matching always works through the built-in [`NccCorrelator`] unless another
/// correlator is supplied. Feature and text matching need their capabilities configured.
pub struct ImgRecogEngine {
    correlator: Arc<dyn TemplateCorrelator>,
    feature_detector: Option<Arc<dyn FeatureDetector>>,
    homography_estimator: Option<Arc<dyn HomographyEstimator>>,
    text_detector: Option<Arc<dyn TextDetector>>,
    ocr_engine: Option<Arc<dyn OcrEngine>>,
    screen: ScreenProfile,
}

impl Default for ImgRecogEngine {
    fn default() -> Self {
        Self::new(ScreenProfile::default())
    }
}

impl ImgRecogEngine {
    pub fn new(screen: ScreenProfile) -> Self {
        Self {
            correlator: Arc::new(NccCorrelator),
            feature_detector: None,
            homography_estimator: None,
            text_detector: None,
            ocr_engine: None,
            screen,
        }
    }

    pub fn with_correlator(mut self, correlator: Arc<dyn TemplateCorrelator>) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn with_feature_matching(
        mut self,
        detector: Arc<dyn FeatureDetector>,
        estimator: Arc<dyn HomographyEstimator>,
    ) -> Self {
        self.feature_detector = Some(detector);
        self.homography_estimator = Some(estimator);
        self
    }

    pub fn with_text_recognition(
        mut self,
        detector: Arc<dyn TextDetector>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        self.text_detector = Some(detector);
        self.ocr_engine = Some(ocr);
        self
    }

    pub fn screen(&self) -> &ScreenProfile {
        &self.screen
    }

    /// Update the screen profile, e.g. after the device was rotated.
    pub fn set_screen(&mut self, screen: ScreenProfile) {
        self.screen = screen;
    }

    // ====================================================================================
    // Single locator
    // ====================================================================================

    /// Best element for `spec` in `screenshot`, or `None` if nothing matched.
    pub fn find_element(
        &self,
        spec: &LocatorSpec,
        screenshot: &DynamicImage,
    ) -> RecogResult<Option<ResolvedElement>> {
        let found = self.locate(spec, screenshot, false)?.into_iter().next();
        found
            .map(|candidate| self.to_element(&candidate, std::slice::from_ref(spec)))
            .transpose()
    }

    /// Every element for `spec` in `screenshot`. Feature matching cannot list elements.
    pub fn find_elements(
        &self,
        spec: &LocatorSpec,
        screenshot: &DynamicImage,
    ) -> RecogResult<Vec<ResolvedElement>> {
        self.locate(spec, screenshot, true)?
            .iter()
            .map(|candidate| self.to_element(candidate, std::slice::from_ref(spec)))
            .collect()
    }

    pub fn find_element_in_bytes(
        &self,
        spec: &LocatorSpec,
        screenshot: &[u8],
    ) -> RecogResult<Option<ResolvedElement>> {
        self.find_element(spec, &decode_screenshot(screenshot)?)
    }

    pub fn find_elements_in_bytes(
        &self,
        spec: &LocatorSpec,
        screenshot: &[u8],
    ) -> RecogResult<Vec<ResolvedElement>> {
        self.find_elements(spec, &decode_screenshot(screenshot)?)
    }

    /// Read the trimmed text in `rect` of `image`; blank regions read as an empty string.
    pub fn recognise(&self, image: &DynamicImage, rect: Rect) -> RecogResult<String> {
        let ocr = self
            .ocr_engine
            .as_deref()
            .ok_or_else(|| not_configured("ocr engine", "text recognition"))?;
        let rect = rect.ensure_within(Size::of_image(image))?;
        let recognition = ocr
            .recognize(image, rect)
            .map_err(|e| RecogError::capability("ocr engine", e))?;
        Ok(recognition.text.trim().to_string())
    }

    // ====================================================================================
    // Internals
    // ====================================================================================

    /// Candidates in full screenshot coordinates, best first.
    fn locate(
        &self,
        spec: &LocatorSpec,
        screenshot: &DynamicImage,
        all: bool,
    ) -> RecogResult<Vec<MatchCandidate>> {
        spec.validate()?;
        if all && matches!(spec.method, Method::Feature(_)) {
            return Err(RecogError::UnsupportedFindAll {
                method: spec.method_name(),
            });
        }
        let full_size = Size::of_image(screenshot);
        if full_size.is_empty() {
            return Err(RecogError::empty_image(format!(
                "screenshot is {}x{}",
                full_size.width, full_size.height
            )));
        }

        let cutout_rect = spec
            .cutout
            .as_ref()
            .map(|fractional| to_absolute(full_size, fractional))
            .transpose()?;
        let region = match &cutout_rect {
            Some(rect) => {
                log::debug!("Searching cutout {rect:?} of {}x{}", full_size.width, full_size.height);
                Cow::Owned(cutout(screenshot, rect)?)
            }
            None => Cow::Borrowed(screenshot),
        };

        let candidates = self.run_method(spec, &region, all)?;
        log::info!(
            "{} located {} candidate(s)",
            spec.method_name(),
            candidates.len()
        );
        Ok(match cutout_rect {
            Some(rect) => candidates
                .into_iter()
                .map(|candidate| reverse_cutout(candidate, &rect, full_size))
                .collect(),
            None => candidates,
        })
    }

    fn run_method(
        &self,
        spec: &LocatorSpec,
        region: &DynamicImage,
        all: bool,
    ) -> RecogResult<Vec<MatchCandidate>> {
        match &spec.method {
            Method::Template(params) => {
                let template = load_template(spec)?;
                let matcher = TemplateMatcher::new(self.correlator.as_ref(), params);
                if all {
                    let candidates = matcher.find_all(&template, region)?;
                    let total = candidates.len();
                    let passing: Vec<MatchCandidate> = candidates
                        .into_iter()
                        .filter(MatchCandidate::is_over_threshold)
                        .collect();
                    if passing.len() < total {
                        log::debug!("Dropped {} near misses", total - passing.len());
                    }
                    Ok(passing)
                } else {
                    Ok(matcher.find_one(&template, region)?.into_iter().collect())
                }
            }
            Method::Feature(params) => {
                let (Some(detector), Some(estimator)) = (
                    self.feature_detector.as_deref(),
                    self.homography_estimator.as_deref(),
                ) else {
                    return Err(not_configured("feature detector", "feature matching"));
                };
                let template = load_template(spec)?;
                let outcome = FeatureMatcher::new(detector, estimator, params)
                    .locate(&template, region)?;
                Ok(outcome.candidate.into_iter().collect())
            }
            Method::Ocr(params) => {
                let (Some(detector), Some(ocr)) =
                    (self.text_detector.as_deref(), self.ocr_engine.as_deref())
                else {
                    return Err(not_configured("text detector", "text matching"));
                };
                let pipeline = TextPipeline::new(detector, ocr, params);
                if all {
                    pipeline.find_all(region)
                } else {
                    Ok(pipeline.find_one(region)?.into_iter().collect())
                }
            }
        }
    }

    /// Screen rectangle for a candidate; the offset of the last spec in `specs` applies.
    fn to_element(
        &self,
        candidate: &MatchCandidate,
        specs: &[LocatorSpec],
    ) -> RecogResult<ResolvedElement> {
        let offset = specs.last().and_then(|spec| spec.offset.as_ref());
        let rect = reconcile(candidate, offset, &self.screen)?;
        Ok(ResolvedElement::new(rect, specs.to_vec(), candidate.score))
    }
}

fn not_configured(capability: &'static str, method: &str) -> RecogError {
    RecogError::capability(
        capability,
        format!("no {capability} configured, {method} is unavailable"),
    )
}

fn decode_screenshot(bytes: &[u8]) -> RecogResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(RecogError::empty_image("screenshot has no bytes"));
    }
    Ok(image::load_from_memory(bytes)?)
}

fn load_template(spec: &LocatorSpec) -> RecogResult<DynamicImage> {
    let template = match &spec.template {
        Some(TemplateSource::Path(path)) => {
            log::debug!("Reading template {}", path.display());
            image::open(path)?
        }
        Some(TemplateSource::Bytes(bytes)) if !bytes.is_empty() => image::load_from_memory(bytes)?,
        _ => {
            return Err(RecogError::config(
                "template",
                format!("the '{}' method needs a template image", spec.method_name()),
            ));
        }
    };
    if template.width() == 0 || template.height() == 0 {
        return Err(RecogError::empty_image("template decodes to an empty image"));
    }
    Ok(template)
}
