//! Tests for the engine: cutouts, screen correction, chains and the text pipeline

use super::*;
use crate::capability::{
    Correlation, Correspondence, DetectorSettings, Features, Homography, KeyPoint, Recognition,
    SharedCapability, TextDetectorOutput,
};
use crate::error::CapabilityError;
use crate::geometry::{FractionalRectangle, Point, PointF};
use crate::locator::{FeatureParams, OcrParams, OcrTest, Padding, TemplateParams};
use approx::assert_relative_eq;
use image::ImageFormat;
use std::cell::Cell;
use std::io::Cursor;

// ========================================================================================
// Fakes
// ========================================================================================

/// Places each template by its width: `(width, location, score)`.
struct Placements(Vec<(u32, Point, f32)>);

impl TemplateCorrelator for Placements {
    fn correlate(
        &self,
        template: &DynamicImage,
        _source: &DynamicImage,
    ) -> Result<Correlation, CapabilityError> {
        let (location, score) = self
            .0
            .iter()
            .find(|(width, _, _)| *width == template.width())
            .map(|(_, location, score)| (*location, *score))
            .unwrap_or((Point::new(0, 0), 0.0));
        Ok(Correlation {
            rect: Rect::new(
                location.x,
                location.y,
                template.width() as i32,
                template.height() as i32,
            ),
            score,
        })
    }
}

/// Reports one unrotated box per scored cell, 4 px to each side and 2 px above and below.
struct GridDetector {
    cells: Vec<(usize, usize, f32)>,
}

impl TextDetector for GridDetector {
    fn input_size(&self) -> Result<Size, CapabilityError> {
        Ok(Size::new(64, 64))
    }

    fn forward(&self, image: &DynamicImage) -> Result<TextDetectorOutput, CapabilityError> {
        if (image.width(), image.height()) != (64, 64) {
            return Err(format!("expected a 64x64 blob, got {}x{}", image.width(), image.height()).into());
        }
        let (rows, cols) = (16, 16);
        let mut output = TextDetectorOutput {
            rows,
            cols,
            scores: vec![0.0; rows * cols],
            geometry: std::array::from_fn(|_| vec![0.0; rows * cols]),
        };
        for &(row, col, score) in &self.cells {
            let i = row * cols + col;
            output.scores[i] = score;
            output.geometry[0][i] = 2.0;
            output.geometry[1][i] = 4.0;
            output.geometry[2][i] = 2.0;
            output.geometry[3][i] = 4.0;
        }
        Ok(output)
    }
}

/// Reads a fixed answer per box, keyed by the box's x coordinate.
struct ScriptedOcr;

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, _image: &DynamicImage, rect: Rect) -> Result<Recognition, CapabilityError> {
        match rect.x {
            8 => Ok(Recognition::new("Login", Some(0.7))),
            24 => Ok(Recognition::new(" login ", None)),
            other => Err(format!("unreadable box at x={other}").into()),
        }
    }
}

/// Reports `n` keypoints on every image and pairs them one to one.
struct Keypoints(usize);

impl FeatureDetector for Keypoints {
    fn detect_and_describe(
        &self,
        _image: &DynamicImage,
        _settings: &DetectorSettings<'_>,
    ) -> Result<Features, CapabilityError> {
        Ok(Features {
            keypoints: (0..self.0).map(|i| KeyPoint::new(i as f64, i as f64)).collect(),
            descriptors: (0..self.0).map(|i| vec![i as u8]).collect(),
        })
    }

    fn match_descriptors(
        &self,
        query: &Features,
        train: &Features,
    ) -> Result<Vec<Correspondence>, CapabilityError> {
        let n = query.keypoints.len().min(train.keypoints.len());
        Ok((0..n)
            .map(|i| Correspondence {
                query_idx: i,
                train_idx: i,
                distance: i as f32,
            })
            .collect())
    }
}

struct Translation(f64, f64);

impl HomographyEstimator for Translation {
    fn fit(&self, _query: &[PointF], _train: &[PointF]) -> Result<Homography, CapabilityError> {
        Ok(Homography::translation(self.0, self.1))
    }
}

struct Blank;

impl OcrEngine for Blank {
    fn recognize(&self, _image: &DynamicImage, _rect: Rect) -> Result<Recognition, CapabilityError> {
        Ok(Recognition::new("   ", None))
    }
}

// ========================================================================================
// Helpers
// ========================================================================================

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_luma8(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encoding a blank image");
    bytes
}

fn template_spec(width: u32) -> crate::locator::LocatorSpecBuilder {
    let params = TemplateParams {
        resize_max_attempts: 0,
        ..TemplateParams::default()
    };
    LocatorSpec::builder(params).template_bytes(png(width, width))
}

fn engine_with(placements: Vec<(u32, Point, f32)>, screen: ScreenProfile) -> ImgRecogEngine {
    ImgRecogEngine::new(screen).with_correlator(Arc::new(Placements(placements)))
}

fn text_engine() -> ImgRecogEngine {
    let detector = GridDetector {
        cells: vec![(2, 2, 0.9), (10, 4, 0.95), (2, 10, 0.99)],
    };
    ImgRecogEngine::default().with_text_recognition(
        Arc::new(detector),
        Arc::new(SharedCapability::new("ocr engine", || Ok(ScriptedOcr))),
    )
}

fn login_spec() -> LocatorSpec {
    let params = OcrParams {
        padding: Padding::new(0.0, 0.0, 0.0, 0.0),
        ..OcrParams::new("login", OcrTest::EqualsIgnoreCase)
    };
    LocatorSpec::builder(params).build().unwrap()
}

// ========================================================================================
// Single locator
// ========================================================================================

#[test]
fn test_cutout_match_maps_back_to_screenshot() {
    let engine = engine_with(vec![(50, Point::new(10, 10), 0.99)], ScreenProfile::default());
    let spec = template_spec(50)
        .cutout(FractionalRectangle::new(0.1, 0.1, 0.5, 0.5))
        .build()
        .unwrap();
    let screenshot = DynamicImage::new_luma8(1000, 1000);

    let element = engine
        .find_element(&spec, &screenshot)
        .unwrap()
        .expect("placement scores over the threshold");
    assert_eq!(element.rect(), Rect::new(110, 110, 50, 50));
    assert_eq!(element.centre(), Point::new(135, 135));
    assert_eq!(element.size(), Size::new(50, 50));
    assert!(element.is_displayed());
    assert_eq!(element.locators(), &[spec]);
}

#[test]
fn test_below_threshold_is_not_found() {
    let engine = engine_with(vec![(50, Point::new(10, 10), 0.5)], ScreenProfile::default());
    let spec = template_spec(50).build().unwrap();
    let found = engine
        .find_element(&spec, &DynamicImage::new_luma8(200, 200))
        .unwrap();
    assert!(found.is_none());
    assert!(
        engine
            .find_elements(&spec, &DynamicImage::new_luma8(200, 200))
            .unwrap()
            .is_empty(),
        "near misses must not become elements"
    );
}

#[test]
fn test_status_bar_screenshot_shifts_up() {
    let screen = ScreenProfile::android(
        Size::new(1080, 2220),
        SystemBars {
            status_bar_height: 60,
            navigation_bar_height: 120,
        },
    );
    let engine = engine_with(vec![(50, Point::new(100, 260), 0.99)], screen);
    let screenshot = DynamicImage::new_luma8(1080, 2280);

    let plain = template_spec(50).build().unwrap();
    let element = engine.find_element(&plain, &screenshot).unwrap().unwrap();
    assert_eq!(element.rect(), Rect::new(100, 200, 50, 50));

    // The label to the right of the found icon, twice as wide
    let with_offset = template_spec(50)
        .offset(FractionalRectangle::new(1.0, 0.0, 2.0, 1.0))
        .build()
        .unwrap();
    let label = engine.find_element(&with_offset, &screenshot).unwrap().unwrap();
    assert_eq!(label.rect(), Rect::new(150, 200, 100, 50));
}

#[test]
fn test_scaled_screenshot_rescales_proportionally() {
    let engine = engine_with(
        vec![(50, Point::new(100, 260), 0.99)],
        ScreenProfile::ios(Size::new(540, 1140)),
    );
    let element = engine
        .find_element(&template_spec(50).build().unwrap(), &DynamicImage::new_luma8(1080, 2280))
        .unwrap()
        .unwrap();
    assert_eq!(element.rect(), Rect::new(50, 130, 25, 25));
}

#[test]
fn test_feature_cannot_find_all() {
    let spec = LocatorSpec::builder(FeatureParams::default())
        .template_bytes(png(10, 10))
        .build()
        .unwrap();
    let err = ImgRecogEngine::default()
        .find_elements(&spec, &DynamicImage::new_luma8(100, 100))
        .unwrap_err();
    assert!(matches!(err, RecogError::UnsupportedFindAll { method: "feature" }));
}

#[test]
fn test_feature_match_in_cutout_with_offset() {
    let engine = ImgRecogEngine::default()
        .with_feature_matching(Arc::new(Keypoints(40)), Arc::new(Translation(30.0, 12.0)));
    // Cutout (100, 100, 200, 200); the warped 20x20 template lands at (30, 12, 19, 19) in it
    let spec = LocatorSpec::builder(FeatureParams::default())
        .template_bytes(png(20, 20))
        .cutout(FractionalRectangle::new(0.25, 0.25, 0.5, 0.5))
        .build()
        .unwrap();
    let screenshot = DynamicImage::new_luma8(400, 400);

    let element = engine
        .find_element(&spec, &screenshot)
        .unwrap()
        .expect("40 matches clear the default 30");
    assert_eq!(element.rect(), Rect::new(130, 112, 19, 19));
    assert_relative_eq!(element.score(), 40.0);

    // The field just below the matched icon
    let below = LocatorSpec {
        offset: Some(FractionalRectangle::new(0.0, 1.0, 1.0, 1.0)),
        ..spec
    };
    let field = engine.find_element(&below, &screenshot).unwrap().unwrap();
    assert_eq!(field.rect(), Rect::new(130, 131, 19, 19));
}

#[test]
fn test_feature_match_with_too_few_matches_is_not_found() {
    let engine = ImgRecogEngine::default()
        .with_feature_matching(Arc::new(Keypoints(12)), Arc::new(Translation(0.0, 0.0)));
    let spec = LocatorSpec::builder(FeatureParams::default())
        .template_bytes(png(20, 20))
        .build()
        .unwrap();
    let found = engine
        .find_element(&spec, &DynamicImage::new_luma8(100, 100))
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn test_missing_capability_is_reported() {
    let spec = LocatorSpec::builder(FeatureParams::default())
        .template_bytes(png(10, 10))
        .build()
        .unwrap();
    let err = ImgRecogEngine::default()
        .find_element(&spec, &DynamicImage::new_luma8(100, 100))
        .unwrap_err();
    assert!(matches!(err, RecogError::Capability { .. }), "got {err}");
}

#[test]
fn test_screenshot_bytes_must_decode() {
    let engine = ImgRecogEngine::default();
    let spec = template_spec(10).build().unwrap();
    assert!(matches!(
        engine.find_element_in_bytes(&spec, &[]).unwrap_err(),
        RecogError::EmptyImage { .. }
    ));
    assert!(matches!(
        engine.find_element_in_bytes(&spec, b"not an image").unwrap_err(),
        RecogError::Image { .. }
    ));
}

#[test]
fn test_screenshot_bytes_are_searched() {
    let engine = engine_with(vec![(10, Point::new(5, 6), 0.9)], ScreenProfile::default());
    let spec = template_spec(10).build().unwrap();
    let element = engine
        .find_element_in_bytes(&spec, &png(40, 40))
        .unwrap()
        .unwrap();
    assert_eq!(element.rect(), Rect::new(5, 6, 10, 10));
}

// ========================================================================================
// Chains
// ========================================================================================

fn chain_engine() -> ImgRecogEngine {
    engine_with(
        vec![
            (100, Point::new(100, 100), 0.95),
            (20, Point::new(140, 140), 0.9),
            (30, Point::new(300, 300), 0.9),
            (40, Point::new(0, 0), 0.1),
        ],
        ScreenProfile::default(),
    )
}

#[test]
fn test_successive_confirms_inside_previous() {
    let engine = chain_engine();
    let specs = vec![
        template_spec(100).build().unwrap(),
        template_spec(20).build().unwrap(),
    ];
    let element = engine
        .find_element_chain(&specs, &DynamicImage::new_luma8(400, 400), ChainMode::Successive)
        .unwrap()
        .expect("centre (150, 150) lies inside (100, 100, 100, 100)");
    assert_eq!(element.rect(), Rect::new(140, 140, 20, 20));
    assert_eq!(element.locators().len(), 2);
}

#[test]
fn test_successive_fails_when_centre_outside() {
    let engine = chain_engine();
    let specs = vec![
        template_spec(100).build().unwrap(),
        template_spec(30).build().unwrap(),
    ];
    let found = engine
        .find_element_chain(&specs, &DynamicImage::new_luma8(400, 400), ChainMode::Successive)
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn test_successive_fails_when_a_step_finds_nothing() {
    let engine = chain_engine();
    let specs = vec![
        template_spec(40).build().unwrap(),
        template_spec(20).build().unwrap(),
    ];
    let found = engine
        .find_element_chain(&specs, &DynamicImage::new_luma8(400, 400), ChainMode::Successive)
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn test_alternative_returns_first_success_unchanged() {
    let engine = chain_engine();
    let screenshot = DynamicImage::new_luma8(400, 400);
    let fallback = template_spec(20).build().unwrap();
    let specs = vec![template_spec(40).build().unwrap(), fallback.clone()];

    let chained = engine
        .find_element_chain(&specs, &screenshot, ChainMode::Alternative)
        .unwrap();
    let direct = engine.find_element(&fallback, &screenshot).unwrap();
    assert!(chained.is_some());
    assert_eq!(chained, direct);
}

#[test]
fn test_empty_chain_is_configuration_error() {
    let err = ImgRecogEngine::default()
        .find_element_chain(&[], &DynamicImage::new_luma8(10, 10), ChainMode::Alternative)
        .unwrap_err();
    assert!(err.is_configuration());
}

// ========================================================================================
// Text
// ========================================================================================

#[test]
fn test_text_pipeline_picks_most_confident_match() {
    let engine = text_engine();
    let screenshot = DynamicImage::new_rgb8(128, 64);

    // The box at x=72 cannot be read and is skipped; x=8 reads "Login" at 0.7 and x=24
    // reads "login" with the detector's 0.95
    let element = engine
        .find_element(&login_spec(), &screenshot)
        .unwrap()
        .expect("two boxes read as login");
    assert_eq!(element.rect(), Rect::new(24, 38, 18, 5));
    assert_relative_eq!(element.score(), 0.95f32 as f64);
}

#[test]
fn test_lazily_built_detector_works_on_first_call() {
    let engine = ImgRecogEngine::default().with_text_recognition(
        Arc::new(SharedCapability::new("text detector", || {
            Ok(GridDetector {
                cells: vec![(2, 2, 0.9), (10, 4, 0.95), (2, 10, 0.99)],
            })
        })),
        Arc::new(ScriptedOcr),
    );
    let screenshot = DynamicImage::new_rgb8(128, 64);
    for call in 0..2 {
        let element = engine
            .find_element(&login_spec(), &screenshot)
            .unwrap_or_else(|e| panic!("call {call} failed: {e}"));
        assert_eq!(
            element.map(|e| e.rect()),
            Some(Rect::new(24, 38, 18, 5)),
            "call {call} used the wrong working size"
        );
    }
}

#[test]
fn test_text_pipeline_lists_in_reading_order() {
    let engine = text_engine();
    let all = engine
        .find_elements(&login_spec(), &DynamicImage::new_rgb8(128, 64))
        .unwrap();
    let rects: Vec<Rect> = all.iter().map(ResolvedElement::rect).collect();
    assert_eq!(rects, vec![Rect::new(8, 6, 18, 5), Rect::new(24, 38, 18, 5)]);
}

#[test]
fn test_recognise_and_blank_text() {
    let engine = ImgRecogEngine::default().with_text_recognition(
        Arc::new(GridDetector { cells: Vec::new() }),
        Arc::new(Blank),
    );
    let screenshot = DynamicImage::new_rgb8(50, 50);
    let rect = Rect::new(5, 5, 20, 10);
    assert_eq!(engine.recognise(&screenshot, rect).unwrap(), "");

    let element = ResolvedElement::new(rect, Vec::new(), 1.0);
    assert!(element.is_text_empty(&engine, &screenshot).unwrap());
}

#[test]
fn test_unreadable_region_is_an_error_not_blank() {
    let engine = ImgRecogEngine::default().with_text_recognition(
        Arc::new(GridDetector { cells: Vec::new() }),
        Arc::new(ScriptedOcr),
    );
    let screenshot = DynamicImage::new_rgb8(100, 50);
    let element = ResolvedElement::new(Rect::new(72, 6, 18, 5), Vec::new(), 1.0);
    let err = element.is_text_empty(&engine, &screenshot).unwrap_err();
    assert!(matches!(err, RecogError::Capability { .. }), "got {err}");
    assert_eq!(
        engine.recognise(&screenshot, Rect::new(8, 6, 18, 5)).unwrap(),
        "Login"
    );
}

// ========================================================================================
// Lazy element
// ========================================================================================

#[test]
fn test_lazy_element_resolves_once() {
    let engine = engine_with(vec![(10, Point::new(5, 6), 0.9)], ScreenProfile::default());
    let screenshot = DynamicImage::new_luma8(40, 40);
    let captures = Cell::new(0);
    let lazy = LazyElement::new(
        &engine,
        vec![template_spec(10).build().unwrap()],
        ChainMode::Alternative,
        || {
            captures.set(captures.get() + 1);
            Ok(screenshot.clone())
        },
    );
    assert!(!lazy.is_resolved());

    let first = lazy.get().unwrap().map(ResolvedElement::rect);
    let second = lazy.get().unwrap().map(ResolvedElement::rect);
    assert_eq!(first, Some(Rect::new(5, 6, 10, 10)));
    assert_eq!(first, second);
    assert!(lazy.is_resolved());
    assert_eq!(captures.get(), 1, "screenshot taken on first access only");
}
