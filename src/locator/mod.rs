pub mod config;
pub mod filters;
pub mod ocr_rules;

pub use config::{
    FeatureParams, LocatorSpec, LocatorSpecBuilder, Method, OcrParams, OrbTuning, Padding,
    Platform, ScoreType, TemplateParams, TemplateSource, select_for_platform,
};
pub use filters::{ImageFilter, apply_filters};
pub use ocr_rules::{OcrCleanUp, OcrTest, TextPredicate, clean_up};
