//! Locator specifications: which method to run, with what parameters, on which platform

use super::filters::ImageFilter;
use super::ocr_rules::{OcrCleanUp, OcrTest};
use crate::error::{RecogError, RecogResult};
use crate::geometry::FractionalRectangle;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Template matching defaults
pub const MATCH_THRESHOLD: f32 = 0.8;
pub const RESIZE_FACTOR: f64 = 1.052;
pub const RESIZE_MAX_ATTEMPTS: u32 = 4;

/// Feature matching defaults
pub const NUM_OF_QUERY_FEATURES: u32 = 400;
pub const NUM_OF_TRAIN_FEATURES: u32 = 2000;
pub const MIN_NUM_OF_MATCHES: usize = 30;
pub const NUM_OF_MATCHES_TO_KEEP: usize = 30;
/// Smallest number of correspondences a homography can be fitted on reliably.
pub const MIN_CORRESPONDENCES: usize = 8;

/// Text matching defaults
pub const MIN_SCORE: f32 = 0.8;
pub const NMS_THRESHOLD: f32 = 0.4;
pub const IOU_THRESHOLD: f32 = 0.0001;
pub const LEFT_PADDING: f64 = 0.03;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Android,
    Ios,
}

impl FromStr for Platform {
    type Err = RecogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            other => Err(RecogError::config(
                "platform",
                format!("unknown platform '{other}', expected 'android' or 'ios'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateParams {
    /// Minimum correlation score (0.0 to 1.0)
    pub match_threshold: f32,
    /// Scale step between attempts, must be greater than 1
    pub resize_factor: f64,
    /// Number of grow/shrink steps tried besides the original scale
    pub resize_max_attempts: u32,
    pub pre_resize_filters: Vec<ImageFilter>,
    pub post_resize_filters: Vec<ImageFilter>,
}

impl Default for TemplateParams {
    fn default() -> Self {
        Self {
            match_threshold: MATCH_THRESHOLD,
            resize_factor: RESIZE_FACTOR,
            resize_max_attempts: RESIZE_MAX_ATTEMPTS,
            pre_resize_filters: Vec::new(),
            post_resize_filters: Vec::new(),
        }
    }
}

impl TemplateParams {
    /// Pixel-exact UI elements: original scale only, high threshold
    pub fn strict() -> Self {
        Self {
            match_threshold: 0.95,
            resize_max_attempts: 0,
            ..Self::default()
        }
    }

    /// Elements rendered at unknown density, e.g. across devices
    pub fn scale_tolerant() -> Self {
        Self {
            match_threshold: 0.75,
            resize_factor: 1.1,
            resize_max_attempts: 8,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> RecogResult<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(RecogError::config(
                "match_threshold",
                format!("must be within [0, 1] but was {}", self.match_threshold),
            ));
        }
        if !(self.resize_factor.is_finite() && self.resize_factor > 1.0) {
            return Err(RecogError::config(
                "resize_factor",
                format!("must be greater than 1 but was {}", self.resize_factor),
            ));
        }
        Ok(())
    }
}

/// Keypoint scoring used by the detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    #[default]
    Harris,
    Fast,
}

/// ORB-style detector tuning, passed through to the feature detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbTuning {
    pub scale_factor: f64,
    pub n_levels: i32,
    pub edge_threshold: i32,
    pub first_level: i32,
    pub wta_k: i32,
    pub score_type: ScoreType,
    pub patch_size: i32,
    pub fast_threshold: i32,
}

impl Default for OrbTuning {
    fn default() -> Self {
        Self {
            scale_factor: 1.2,
            n_levels: 8,
            edge_threshold: 31,
            first_level: 0,
            wta_k: 2,
            score_type: ScoreType::Harris,
            patch_size: 31,
            fast_threshold: 20,
        }
    }
}

impl OrbTuning {
    pub fn validate(&self) -> RecogResult<()> {
        if !(self.scale_factor.is_finite() && self.scale_factor > 1.0) {
            return Err(RecogError::config(
                "scale_factor",
                format!("must be greater than 1 but was {}", self.scale_factor),
            ));
        }
        if self.n_levels < 1 {
            return Err(RecogError::config(
                "n_levels",
                format!("must be at least 1 but was {}", self.n_levels),
            ));
        }
        if self.first_level < 0 {
            return Err(RecogError::config(
                "first_level",
                format!("must not be negative but was {}", self.first_level),
            ));
        }
        if !(2..=4).contains(&self.wta_k) {
            return Err(RecogError::config(
                "wta_k",
                format!("must be 2, 3 or 4 but was {}", self.wta_k),
            ));
        }
        if self.patch_size < 2 {
            return Err(RecogError::config(
                "patch_size",
                format!("must be at least 2 but was {}", self.patch_size),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Keypoints extracted from the template
    pub query_features: u32,
    /// Keypoints extracted from the screenshot
    pub train_features: u32,
    pub min_num_of_matches: usize,
    pub num_of_matches_to_keep: usize,
    pub tuning: OrbTuning,
    pub filters: Vec<ImageFilter>,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            query_features: NUM_OF_QUERY_FEATURES,
            train_features: NUM_OF_TRAIN_FEATURES,
            min_num_of_matches: MIN_NUM_OF_MATCHES,
            num_of_matches_to_keep: NUM_OF_MATCHES_TO_KEEP,
            tuning: OrbTuning::default(),
            filters: Vec::new(),
        }
    }
}

impl FeatureParams {
    pub fn validate(&self) -> RecogResult<()> {
        if self.query_features == 0 {
            return Err(RecogError::config("query_features", "must be greater than 0"));
        }
        if self.train_features == 0 {
            return Err(RecogError::config("train_features", "must be greater than 0"));
        }
        if self.min_num_of_matches < MIN_CORRESPONDENCES {
            return Err(RecogError::config(
                "min_num_of_matches",
                format!(
                    "must be at least {MIN_CORRESPONDENCES} but was {}",
                    self.min_num_of_matches
                ),
            ));
        }
        if self.num_of_matches_to_keep < MIN_CORRESPONDENCES {
            return Err(RecogError::config(
                "num_of_matches_to_keep",
                format!(
                    "must be at least {MIN_CORRESPONDENCES} but was {}",
                    self.num_of_matches_to_keep
                ),
            ));
        }
        self.tuning.validate()
    }
}

/// Fractions of a detected text box's width (left/right) or height (top/bottom) added to
/// each side. Negative values shrink the box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Padding {
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }
}

impl Default for Padding {
    fn default() -> Self {
        Self::new(LEFT_PADDING, 0.0, 0.0, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrParams {
    pub search_term: String,
    pub ocr_test: OcrTest,
    /// Minimum text detection confidence
    pub min_score: f32,
    /// Non-maximum suppression overlap threshold
    pub nms: f32,
    /// Overlap at which remaining boxes are merged
    pub iou: f32,
    pub padding: Padding,
    pub clean_up: Vec<OcrCleanUp>,
    pub filters: Vec<ImageFilter>,
}

impl Default for OcrParams {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            ocr_test: OcrTest::Equals,
            min_score: MIN_SCORE,
            nms: NMS_THRESHOLD,
            iou: IOU_THRESHOLD,
            padding: Padding::default(),
            clean_up: Vec::new(),
            filters: Vec::new(),
        }
    }
}

impl OcrParams {
    pub fn new(search_term: impl Into<String>, ocr_test: OcrTest) -> Self {
        Self {
            search_term: search_term.into(),
            ocr_test,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> RecogResult<()> {
        if self.search_term.is_empty() {
            return Err(RecogError::config("search_term", "must not be empty"));
        }
        for (field, value) in [("min_score", self.min_score), ("nms", self.nms), ("iou", self.iou)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RecogError::config(
                    field,
                    format!("must be within [0, 1] but was {value}"),
                ));
            }
        }
        let p = &self.padding;
        if ![p.left, p.right, p.top, p.bottom].iter().all(|v| v.is_finite()) {
            return Err(RecogError::config("padding", format!("non-finite component in {p:?}")));
        }
        // Surface a bad regex now rather than on the first screenshot
        self.ocr_test.compile(&self.search_term).map(|_| ())
    }
}

/// The matching method together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Method {
    Template(TemplateParams),
    Feature(FeatureParams),
    Ocr(OcrParams),
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Template(_) => "template",
            Method::Feature(_) => "feature",
            Method::Ocr(_) => "ocr",
        }
    }

    fn needs_template(&self) -> bool {
        !matches!(self, Method::Ocr(_))
    }

    pub fn validate(&self) -> RecogResult<()> {
        match self {
            Method::Template(params) => params.validate(),
            Method::Feature(params) => params.validate(),
            Method::Ocr(params) => params.validate(),
        }
    }
}

impl From<TemplateParams> for Method {
    fn from(params: TemplateParams) -> Self {
        Method::Template(params)
    }
}

impl From<FeatureParams> for Method {
    fn from(params: FeatureParams) -> Self {
        Method::Feature(params)
    }
}

impl From<OcrParams> for Method {
    fn from(params: OcrParams) -> Self {
        Method::Ocr(params)
    }
}

/// Where the template image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Path(PathBuf),
    /// An encoded image (PNG, JPEG)
    Bytes(Vec<u8>),
}

impl TemplateSource {
    fn is_empty(&self) -> bool {
        match self {
            TemplateSource::Path(path) => path.as_os_str().is_empty(),
            TemplateSource::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

/// One way of locating an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorSpec {
    #[serde(flatten)]
    pub method: Method,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub template: Option<TemplateSource>,
    /// Dependent rectangle relative to the located one
    #[serde(default)]
    pub offset: Option<FractionalRectangle>,
    /// Region of the screenshot to search, relative to its size
    #[serde(default)]
    pub cutout: Option<FractionalRectangle>,
}

impl LocatorSpec {
    pub fn builder(method: impl Into<Method>) -> LocatorSpecBuilder {
        LocatorSpecBuilder {
            spec: LocatorSpec {
                method: method.into(),
                order: 0,
                platform: Platform::default(),
                template: None,
                offset: None,
                cutout: None,
            },
        }
    }

    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    /// Check every parameter range. Runs before any image work.
    pub fn validate(&self) -> RecogResult<()> {
        if self.method.needs_template() && self.template.as_ref().is_none_or(|t| t.is_empty()) {
            return Err(RecogError::config(
                "template",
                format!("the '{}' method needs a template image", self.method.name()),
            ));
        }
        self.method.validate()
    }
}

pub struct LocatorSpecBuilder {
    spec: LocatorSpec,
}

impl LocatorSpecBuilder {
    pub fn order(mut self, order: i32) -> Self {
        self.spec.order = order;
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.spec.platform = platform;
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.template = Some(TemplateSource::Path(path.into()));
        self
    }

    pub fn template_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.spec.template = Some(TemplateSource::Bytes(bytes.into()));
        self
    }

    pub fn offset(mut self, offset: FractionalRectangle) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    pub fn cutout(mut self, cutout: FractionalRectangle) -> Self {
        self.spec.cutout = Some(cutout);
        self
    }

    /// Validate and freeze the spec.
    pub fn build(self) -> RecogResult<LocatorSpec> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// Keep the specs meant for `platform`, in ascending `order`.
pub fn select_for_platform(
    specs: &[LocatorSpec],
    platform: Platform,
) -> RecogResult<Vec<LocatorSpec>> {
    let mut selected: Vec<LocatorSpec> = specs
        .iter()
        .filter(|spec| spec.platform == platform)
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(RecogError::config(
            "platform",
            format!("no locator declared for {platform:?}"),
        ));
    }
    selected.sort_by_key(|spec| spec.order);
    Ok(selected)
}
