use crate::geometry::{Rect, Size};
use serde::{Deserialize, Serialize};

/// Method-specific facts about how a candidate was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchDetail {
    Template {
        /// Relative size of the found element compared with the template
        resize_factor: f64,
        match_threshold: f32,
    },
    Feature {
        min_num_of_matches: usize,
        actual_num_of_matches: usize,
    },
    Text {
        text: String,
        /// Detector confidence of the box the text was read from
        detection_score: f32,
    },
}

/// A rectangle found by one matcher, in the coordinates of the image it searched.
///
/// Scores are only comparable between candidates of the same method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub rect: Rect,
    pub source_size: Size,
    pub score: f64,
    pub detail: MatchDetail,
}

impl MatchCandidate {
    pub fn new(rect: Rect, source_size: Size, score: f64, detail: MatchDetail) -> Self {
        Self {
            rect,
            source_size,
            score,
            detail,
        }
    }

    /// Whether a template candidate cleared its own threshold. Other methods only produce
    /// candidates that already passed their gate.
    pub fn is_over_threshold(&self) -> bool {
        match &self.detail {
            MatchDetail::Template {
                match_threshold, ..
            } => self.score >= *match_threshold as f64,
            _ => true,
        }
    }

    pub fn with_rect(self, rect: Rect) -> Self {
        Self { rect, ..self }
    }

    pub fn with_source_size(self, source_size: Size) -> Self {
        Self {
            source_size,
            ..self
        }
    }
}
