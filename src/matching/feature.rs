//! Keypoint matching with perspective correction
//!
//! The located rectangle is anchored at the warped upper-left corner of the template, with
//! its width taken from the warped top edge and its height from the warped left edge. This
//! only bounds the element tightly when the warp is close to a translation and scale; under
//! strong rotation or skew the rectangle is an approximation of the true quadrilateral.

use super::template::ensure_not_empty;
use super::types::{MatchCandidate, MatchDetail};
use crate::capability::{
    Correspondence, DetectorSettings, FeatureDetector, Features, HomographyEstimator,
};
use crate::error::{RecogError, RecogResult};
use crate::geometry::{PointF, Rect, Size, clamp_rect};
use crate::locator::{FeatureParams, apply_filters};
use image::DynamicImage;

/// Everything learnt from one feature matching attempt.
///
/// The keypoint sets are kept even when no candidate was produced, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct FeatureOutcome {
    pub query: Features,
    pub train: Features,
    pub num_of_matches: usize,
    pub candidate: Option<MatchCandidate>,
}

/// Axis-aligned approximation of the warped template corners, given as
/// upper-left, upper-right, lower-right, lower-left.
pub fn quad_to_rect(corners: &[PointF; 4]) -> Rect {
    let [upper_left, upper_right, _, lower_left] = corners;
    let width = (upper_right.x - upper_left.x - 1.0) as i32;
    let height = (lower_left.y - upper_left.y - 1.0) as i32;
    Rect::new(
        upper_left.x as i32,
        upper_left.y as i32,
        width.max(0),
        height.max(0),
    )
}

pub struct FeatureMatcher<'a> {
    detector: &'a dyn FeatureDetector,
    estimator: &'a dyn HomographyEstimator,
    params: &'a FeatureParams,
}

impl<'a> FeatureMatcher<'a> {
    pub fn new(
        detector: &'a dyn FeatureDetector,
        estimator: &'a dyn HomographyEstimator,
        params: &'a FeatureParams,
    ) -> Self {
        Self {
            detector,
            estimator,
            params,
        }
    }

    /// Locate `template` (the query image) in `source` (the train image).
    pub fn locate(
        &self,
        template: &DynamicImage,
        source: &DynamicImage,
    ) -> RecogResult<FeatureOutcome> {
        ensure_not_empty(template, "template")?;
        ensure_not_empty(source, "source image")?;

        let query_img = apply_filters(template, &self.params.filters);
        let train_img = apply_filters(source, &self.params.filters);

        let query = self
            .detector
            .detect_and_describe(
                &query_img,
                &DetectorSettings {
                    max_features: self.params.query_features,
                    tuning: &self.params.tuning,
                },
            )
            .map_err(|e| RecogError::capability("feature detector", e))?;
        let train = self
            .detector
            .detect_and_describe(
                &train_img,
                &DetectorSettings {
                    max_features: self.params.train_features,
                    tuning: &self.params.tuning,
                },
            )
            .map_err(|e| RecogError::capability("feature detector", e))?;

        let mut outcome = FeatureOutcome {
            query,
            train,
            ..FeatureOutcome::default()
        };
        if outcome.query.is_empty() || outcome.train.is_empty() {
            log::info!(
                "No keypoints to match (query={}, train={})",
                outcome.query.keypoints.len(),
                outcome.train.keypoints.len()
            );
            return Ok(outcome);
        }

        let mut correspondences = self
            .detector
            .match_descriptors(&outcome.query, &outcome.train)
            .map_err(|e| RecogError::capability("descriptor matcher", e))?;
        correspondences.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        outcome.num_of_matches = correspondences.len();

        if correspondences.len() < self.params.min_num_of_matches {
            log::info!(
                "Only {} matches, {} required",
                correspondences.len(),
                self.params.min_num_of_matches
            );
            return Ok(outcome);
        }
        correspondences.truncate(self.params.num_of_matches_to_keep);

        let (query_points, train_points) = self.point_pairs(&outcome, &correspondences)?;
        let homography = self
            .estimator
            .fit(&query_points, &train_points)
            .map_err(|e| RecogError::capability("homography estimator", e))?;

        let (w, h) = (query_img.width() as f64, query_img.height() as f64);
        let corners = [
            PointF::new(0.0, 0.0),
            PointF::new(w, 0.0),
            PointF::new(w, h),
            PointF::new(0.0, h),
        ]
        .map(|p| homography.apply(p));
        let approximated = quad_to_rect(&corners);
        log::debug!("Warped corners {corners:?} approximated by {approximated:?}");
        let rect = clamp_rect(Size::of_image(source), &approximated)?;

        outcome.candidate = Some(MatchCandidate::new(
            rect,
            Size::of_image(source),
            outcome.num_of_matches as f64,
            MatchDetail::Feature {
                min_num_of_matches: self.params.min_num_of_matches,
                actual_num_of_matches: outcome.num_of_matches,
            },
        ));
        Ok(outcome)
    }

    fn point_pairs(
        &self,
        outcome: &FeatureOutcome,
        correspondences: &[Correspondence],
    ) -> RecogResult<(Vec<PointF>, Vec<PointF>)> {
        let mut query_points = Vec::with_capacity(correspondences.len());
        let mut train_points = Vec::with_capacity(correspondences.len());
        for c in correspondences {
            match (
                outcome.query.keypoints.get(c.query_idx),
                outcome.train.keypoints.get(c.train_idx),
            ) {
                (Some(q), Some(t)) => {
                    query_points.push(q.position);
                    train_points.push(t.position);
                }
                _ => {
                    return Err(RecogError::capability(
                        "descriptor matcher",
                        format!(
                            "correspondence {}->{} refers to a missing keypoint",
                            c.query_idx, c.train_idx
                        ),
                    ));
                }
            }
        }
        Ok((query_points, train_points))
    }
}
