//! Scale-invariant template matching
//!
//! The template and the source are resized in opposite directions over a symmetric power
//! sequence of the resize factor, the correlator runs at each scale, and the results are
//! mapped back to source coordinates and ranked by score.

use super::types::{MatchCandidate, MatchDetail};
use crate::capability::TemplateCorrelator;
use crate::error::{RecogError, RecogResult};
use crate::geometry::{Rect, Size, fit_rect};
use crate::geometry::rect::round_half_up;
use crate::locator::{TemplateParams, apply_filters};
use image::DynamicImage;
use image::imageops::FilterType;

/// (template scale, source scale) pairs: `(1, 1)` then `(f^n, f^-n)` and `(f^-n, f^n)` for
/// every `n` in `1..=attempts`.
pub fn scale_pairs(factor: f64, attempts: u32) -> Vec<(f64, f64)> {
    let mut pairs = Vec::with_capacity(1 + 2 * attempts as usize);
    pairs.push((1.0, 1.0));
    for n in 1..=attempts as i32 {
        pairs.push((factor.powi(n), factor.powi(-n)));
        pairs.push((factor.powi(-n), factor.powi(n)));
    }
    pairs
}

fn scaled(image: &DynamicImage, scale: f64) -> DynamicImage {
    if scale == 1.0 {
        return image.clone();
    }
    let width = ((image.width() as f64 * scale).round() as u32).max(1);
    let height = ((image.height() as f64 * scale).round() as u32).max(1);
    image.resize_exact(width, height, FilterType::Triangle)
}

pub(crate) fn ensure_not_empty(image: &DynamicImage, what: &str) -> RecogResult<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RecogError::empty_image(format!(
            "{what} is {}x{}",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

pub struct TemplateMatcher<'a> {
    correlator: &'a dyn TemplateCorrelator,
    params: &'a TemplateParams,
}

impl<'a> TemplateMatcher<'a> {
    pub fn new(correlator: &'a dyn TemplateCorrelator, params: &'a TemplateParams) -> Self {
        Self { correlator, params }
    }

    /// One candidate per scale pair that fits, best score first.
    pub fn match_all_scales(
        &self,
        template: &DynamicImage,
        source: &DynamicImage,
    ) -> RecogResult<Vec<MatchCandidate>> {
        ensure_not_empty(template, "template")?;
        ensure_not_empty(source, "source image")?;

        let source_size = Size::of_image(source);
        let template = apply_filters(template, &self.params.pre_resize_filters);
        let source = apply_filters(source, &self.params.pre_resize_filters);

        let mut candidates = Vec::new();
        for (template_scale, source_scale) in
            scale_pairs(self.params.resize_factor, self.params.resize_max_attempts)
        {
            let scaled_template = scaled(&template, template_scale);
            let scaled_source = scaled(&source, source_scale);

            // Skip if scaled template is larger than the scaled source
            if scaled_template.width() > scaled_source.width()
                || scaled_template.height() > scaled_source.height()
            {
                log::debug!(
                    "Skipping scale {template_scale:.3}/{source_scale:.3}: template {}x{} > source {}x{}",
                    scaled_template.width(),
                    scaled_template.height(),
                    scaled_source.width(),
                    scaled_source.height()
                );
                continue;
            }

            let scaled_template = apply_filters(&scaled_template, &self.params.post_resize_filters);
            let scaled_source = apply_filters(&scaled_source, &self.params.post_resize_filters);
            let correlation = self
                .correlator
                .correlate(&scaled_template, &scaled_source)
                .map_err(|e| RecogError::capability("template correlator", e))?;

            let r = correlation.rect;
            let back = |v: i32| round_half_up(v as f64 / source_scale);
            let rect = fit_rect(
                source_size,
                &Rect::new(back(r.x), back(r.y), back(r.width), back(r.height)),
            );
            log::debug!(
                "Scale {template_scale:.3}/{source_scale:.3}: score {:.4} at {rect:?}",
                correlation.score
            );
            candidates.push(MatchCandidate::new(
                rect,
                source_size,
                correlation.score as f64,
                MatchDetail::Template {
                    resize_factor: template_scale * template_scale,
                    match_threshold: self.params.match_threshold,
                },
            ));
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(candidates)
    }

    /// The best candidate, if it clears the match threshold.
    pub fn find_one(
        &self,
        template: &DynamicImage,
        source: &DynamicImage,
    ) -> RecogResult<Option<MatchCandidate>> {
        let best = self.match_all_scales(template, source)?.into_iter().next();
        match best {
            Some(candidate) if candidate.is_over_threshold() => {
                log::info!(
                    "Template found at {:?} with score {:.4}",
                    candidate.rect,
                    candidate.score
                );
                Ok(Some(candidate))
            }
            Some(candidate) => {
                log::info!(
                    "Best template score {:.4} is below threshold {}",
                    candidate.score,
                    self.params.match_threshold
                );
                Ok(None)
            }
            None => {
                log::info!("Template does not fit the source at any scale");
                Ok(None)
            }
        }
    }

    /// Every candidate over the threshold. When none is, every candidate is returned so the
    /// caller can inspect the near misses; check [`MatchCandidate::is_over_threshold`].
    pub fn find_all(
        &self,
        template: &DynamicImage,
        source: &DynamicImage,
    ) -> RecogResult<Vec<MatchCandidate>> {
        let all = self.match_all_scales(template, source)?;
        let positive: Vec<MatchCandidate> =
            all.iter().filter(|c| c.is_over_threshold()).cloned().collect();
        if positive.is_empty() {
            log::info!("No template candidate clears the threshold, returning {} near misses", all.len());
            Ok(all)
        } else {
            Ok(positive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Correlation, NccCorrelator};
    use crate::error::CapabilityError;
    use crate::matching::tests_support::noise;
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    #[test]
    fn test_scale_pairs_are_reciprocal() {
        let pairs = scale_pairs(1.052, 4);
        assert_eq!(pairs.len(), 9);
        assert_eq!(pairs[0], (1.0, 1.0));
        for (t, s) in &pairs {
            assert_relative_eq!(t * s, 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(pairs[1].0, 1.052);
        assert_relative_eq!(pairs[2].0, 1.0 / 1.052);
        assert_eq!(scale_pairs(1.5, 0), vec![(1.0, 1.0)]);
    }

    #[test]
    fn test_exact_sub_image_at_zero_attempts() {
        let source = noise(80, 60, 3);
        let template = source.crop_imm(23, 17, 15, 12);
        let params = TemplateParams {
            resize_max_attempts: 0,
            ..TemplateParams::default()
        };
        let found = TemplateMatcher::new(&NccCorrelator, &params)
            .find_one(&template, &source)
            .unwrap()
            .expect("exact copy must be found");
        assert_eq!(found.rect, Rect::new(23, 17, 15, 12));
        assert!(found.score > 0.999, "score {}", found.score);
        assert_eq!(found.source_size, Size::new(80, 60));
    }

    /// Records the sizes it was called with and reports a fixed placement.
    struct Recording {
        calls: Mutex<Vec<((u32, u32), (u32, u32))>>,
        scores: Mutex<Vec<f32>>,
    }

    impl TemplateCorrelator for Recording {
        fn correlate(
            &self,
            template: &DynamicImage,
            source: &DynamicImage,
        ) -> Result<Correlation, CapabilityError> {
            self.calls.lock().unwrap().push((
                (template.width(), template.height()),
                (source.width(), source.height()),
            ));
            let score = self.scores.lock().unwrap().remove(0);
            Ok(Correlation {
                rect: Rect::new(10, 10, template.width() as i32, template.height() as i32),
                score,
            })
        }
    }

    #[test]
    fn test_oversized_scales_are_skipped() {
        let correlator = Recording {
            calls: Mutex::new(Vec::new()),
            scores: Mutex::new(vec![0.5, 0.9]),
        };
        let params = TemplateParams {
            resize_factor: 2.0,
            resize_max_attempts: 1,
            ..TemplateParams::default()
        };
        // Template at x2 against source at /2 cannot fit: 20 > 10
        let template = noise(10, 10, 1);
        let source = noise(20, 20, 2);
        let all = TemplateMatcher::new(&correlator, &params)
            .match_all_scales(&template, &source)
            .unwrap();
        let calls = correlator.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![((10, 10), (20, 20)), ((5, 5), (40, 40))]);

        // Ranked by score; the shrunk-template attempt maps back at half size
        assert_eq!(all.len(), 2);
        assert_relative_eq!(all[0].score, 0.9f32 as f64);
        assert_eq!(all[0].rect, Rect::new(5, 5, 3, 3));
        match all[0].detail {
            MatchDetail::Template { resize_factor, .. } => assert_relative_eq!(resize_factor, 0.25),
            ref other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn test_find_all_returns_near_misses_when_nothing_passes() {
        let correlator = Recording {
            calls: Mutex::new(Vec::new()),
            scores: Mutex::new(vec![0.3, 0.4, 0.2]),
        };
        let params = TemplateParams {
            match_threshold: 0.8,
            resize_factor: 1.1,
            resize_max_attempts: 1,
            ..TemplateParams::default()
        };
        let template = noise(10, 10, 1);
        let source = noise(40, 40, 2);
        let matcher = TemplateMatcher::new(&correlator, &params);
        let all = matcher.find_all(&template, &source).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|c| !c.is_over_threshold()));
    }

    #[test]
    fn test_template_larger_than_source_is_not_found() {
        let params = TemplateParams {
            resize_max_attempts: 0,
            ..TemplateParams::default()
        };
        let found = TemplateMatcher::new(&NccCorrelator, &params)
            .find_one(&noise(30, 30, 1), &noise(20, 20, 2))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_empty_template_is_error() {
        let params = TemplateParams::default();
        let empty = DynamicImage::new_luma8(0, 0);
        let err = TemplateMatcher::new(&NccCorrelator, &params)
            .find_one(&empty, &noise(20, 20, 2))
            .unwrap_err();
        assert!(matches!(err, RecogError::EmptyImage { .. }));
    }
}
