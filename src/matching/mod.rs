//! The three location strategies: template correlation, keypoint features and text

pub mod feature;
pub mod template;
pub mod text;
pub mod types;

pub use feature::{FeatureMatcher, FeatureOutcome, quad_to_rect};
pub use template::{TemplateMatcher, scale_pairs};
pub use text::{RotatedRect, TextPipeline, Word, decode, pad_rect};
pub use types::{MatchCandidate, MatchDetail};
