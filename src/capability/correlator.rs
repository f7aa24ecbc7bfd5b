//! Normalised cross-correlation template search

use super::{Correlation, TemplateCorrelator};
use crate::error::CapabilityError;
use crate::geometry::Rect;
use image::DynamicImage;
use imageproc::template_matching::{Extremes, MatchTemplateMethod, find_extremes, match_template};

/// [`TemplateCorrelator`] over the grey levels of both images.
///
/// Scores are normalised cross-correlation in `[0, 1]`; an exact copy scores 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct NccCorrelator;

impl TemplateCorrelator for NccCorrelator {
    fn correlate(
        &self,
        template: &DynamicImage,
        source: &DynamicImage,
    ) -> Result<Correlation, CapabilityError> {
        let template_gray = template.to_luma8();
        let source_gray = source.to_luma8();

        if template_gray.width() == 0
            || template_gray.height() == 0
            || template_gray.width() > source_gray.width()
            || template_gray.height() > source_gray.height()
        {
            return Err(format!(
                "template {}x{} does not fit source {}x{}",
                template_gray.width(),
                template_gray.height(),
                source_gray.width(),
                source_gray.height()
            )
            .into());
        }

        log::trace!(
            "Correlating {}x{} in {}x{}",
            template_gray.width(),
            template_gray.height(),
            source_gray.width(),
            source_gray.height()
        );

        let result = match_template(
            &source_gray,
            &template_gray,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let Extremes {
            max_value,
            max_value_location,
            ..
        } = find_extremes(&result);

        Ok(Correlation {
            rect: Rect::new(
                max_value_location.0 as i32,
                max_value_location.1 as i32,
                template_gray.width() as i32,
                template_gray.height() as i32,
            ),
            score: max_value,
        })
    }
}
