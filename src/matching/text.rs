//! Text detection and recognition
//!
//! The detector network scores every cell of a 4x down-sampled grid and predicts, per cell,
//! the distances to the four edges of a rotated text box plus its angle. Accepted boxes are
//! straightened, scaled back to the input resolution, padded, clamped, de-duplicated and
//! read by the OCR engine in reading order.

use super::template::ensure_not_empty;
use super::types::{MatchCandidate, MatchDetail};
use crate::capability::{OcrEngine, TextDetector, TextDetectorOutput};
use crate::error::{RecogError, RecogResult};
use crate::geometry::{
    PointF, Rect, ScoredBox, Size, fit_rect, merge_overlapping, non_max_suppression,
};
use crate::locator::{OcrParams, Padding, TextPredicate, apply_filters, clean_up};
use image::DynamicImage;
use image::imageops::FilterType;

/// A rectangle rotated by `angle` degrees around its centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: PointF,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedRect {
    pub fn corners(&self) -> [PointF; 4] {
        let radians = self.angle.to_radians();
        let b = radians.cos() * 0.5;
        let a = radians.sin() * 0.5;
        let c = self.center;
        let p0 = PointF::new(
            c.x - a * self.height - b * self.width,
            c.y + b * self.height - a * self.width,
        );
        let p1 = PointF::new(
            c.x + a * self.height - b * self.width,
            c.y - b * self.height - a * self.width,
        );
        let p2 = PointF::new(2.0 * c.x - p0.x, 2.0 * c.y - p0.y);
        let p3 = PointF::new(2.0 * c.x - p1.x, 2.0 * c.y - p1.y);
        [p0, p1, p2, p3]
    }

    /// Smallest integer rectangle containing every corner, edges inclusive.
    pub fn bounding_rect(&self) -> Rect {
        let corners = self.corners();
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        let x = min_x.floor() as i32;
        let y = min_y.floor() as i32;
        Rect::new(
            x,
            y,
            max_x.ceil() as i32 - x + 1,
            max_y.ceil() as i32 - y + 1,
        )
    }
}

/// Rotated boxes for every cell scoring at least `score_threshold`.
pub fn decode(output: &TextDetectorOutput, score_threshold: f32) -> Vec<(f32, RotatedRect)> {
    let mut boxes = Vec::new();
    for row in 0..output.rows {
        for col in 0..output.cols {
            let score = output.score(row, col);
            if score < score_threshold {
                continue;
            }
            let offset_x = col as f64 * TextDetectorOutput::STRIDE;
            let offset_y = row as f64 * TextDetectorOutput::STRIDE;
            let [top, right, bottom, left]: [f64; 4] =
                std::array::from_fn(|plane| output.geometry(plane, row, col) as f64);
            let angle = output.geometry(4, row, col) as f64;
            let (sin, cos) = angle.sin_cos();
            let h = top + bottom;
            let w = right + left;

            let ox = offset_x + cos * right + sin * bottom;
            let oy = offset_y - sin * right + cos * bottom;
            let p1 = PointF::new(-sin * h + ox, -cos * h + oy);
            let p3 = PointF::new(-cos * w + ox, sin * w + oy);
            boxes.push((
                score,
                RotatedRect {
                    center: PointF::new(0.5 * (p1.x + p3.x), 0.5 * (p1.y + p3.y)),
                    width: w,
                    height: h,
                    angle: -angle.to_degrees(),
                },
            ));
        }
    }
    boxes
}

/// Scale a detector-space box by `ratio` and pad its sides, flooring each component.
pub fn pad_rect(rect: &Rect, ratio: (f64, f64), padding: &Padding) -> Rect {
    let width = rect.width as f64 * ratio.0;
    let height = rect.height as f64 * ratio.1;
    let left = padding.left * width;
    let right = padding.right * width;
    let top = padding.top * height;
    let bottom = padding.bottom * height;
    Rect::new(
        (rect.x as f64 * ratio.0 - left).floor() as i32,
        (rect.y as f64 * ratio.1 - top).floor() as i32,
        (width + left + right).floor() as i32,
        (height + top + bottom).floor() as i32,
    )
}

/// Recognised text in a detected box.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub confidence: f32,
    pub detection_score: f32,
    pub rect: Rect,
}

pub struct TextPipeline<'a> {
    detector: &'a dyn TextDetector,
    ocr: &'a dyn OcrEngine,
    params: &'a OcrParams,
}

impl<'a> TextPipeline<'a> {
    pub fn new(
        detector: &'a dyn TextDetector,
        ocr: &'a dyn OcrEngine,
        params: &'a OcrParams,
    ) -> Self {
        Self {
            detector,
            ocr,
            params,
        }
    }

    /// Scored text boxes in `image`, in reading order.
    pub fn detect(&self, image: &DynamicImage) -> RecogResult<Vec<ScoredBox>> {
        let working = self
            .detector
            .input_size()
            .map_err(|e| RecogError::capability("text detector", e))?;
        if working.is_empty() {
            return Err(RecogError::capability(
                "text detector",
                "reported an empty input size",
            ));
        }
        let blob = image.resize_exact(working.width, working.height, FilterType::Triangle);
        let output = self
            .detector
            .forward(&blob)
            .map_err(|e| RecogError::capability("text detector", e))?;
        if !output.is_consistent() {
            return Err(RecogError::capability(
                "text detector",
                format!(
                    "output maps do not match a {}x{} grid",
                    output.rows, output.cols
                ),
            ));
        }

        let ratio = (
            image.width() as f64 / working.width as f64,
            image.height() as f64 / working.height as f64,
        );
        let frame = Size::of_image(image);
        let boxes: Vec<ScoredBox> = decode(&output, self.params.min_score)
            .into_iter()
            .map(|(score, rotated)| {
                let padded = pad_rect(&rotated.bounding_rect(), ratio, &self.params.padding);
                ScoredBox::new(score, fit_rect(frame, &padded))
            })
            .collect();
        log::debug!("Detector accepted {} boxes", boxes.len());

        let mut kept: Vec<ScoredBox> =
            non_max_suppression(&boxes, self.params.min_score, self.params.nms)
                .into_iter()
                .map(|i| boxes[i])
                .collect();
        merge_overlapping(&mut kept, self.params.iou as f64);
        kept.sort_by_key(|b| (b.rect.y, b.rect.x));
        log::debug!("{} boxes after suppression and merging", kept.len());
        Ok(kept)
    }

    /// Read every box. A box the engine fails on is logged and skipped.
    pub fn recognise_words(&self, image: &DynamicImage, boxes: &[ScoredBox]) -> Vec<Word> {
        let mut words = Vec::with_capacity(boxes.len());
        for (i, scored) in boxes.iter().enumerate() {
            match self.ocr.recognize(image, scored.rect) {
                Ok(recognition) => {
                    let text = recognition.text.trim().to_string();
                    log::debug!("word[{i}]={text:?}");
                    words.push(Word {
                        text,
                        confidence: recognition.confidence.unwrap_or(scored.confidence),
                        detection_score: scored.confidence,
                        rect: scored.rect,
                    });
                }
                Err(e) => log::error!("Could not read text in box {i} {:?}: {e}", scored.rect),
            }
        }
        words
    }

    fn matching_words(&self, image: &DynamicImage) -> RecogResult<(Size, Vec<Word>)> {
        ensure_not_empty(image, "source image")?;
        let predicate: TextPredicate =
            self.params.ocr_test.compile(&self.params.search_term)?;
        let filtered = apply_filters(image, &self.params.filters);
        let boxes = self.detect(&filtered)?;
        let words = self.recognise_words(&filtered, &boxes);
        let total = words.len();
        let passing: Vec<Word> = words
            .into_iter()
            .filter(|w| predicate.test(&clean_up(&w.text, &self.params.clean_up)))
            .collect();
        log::info!(
            "{} of {total} words pass {:?} '{}'",
            passing.len(),
            self.params.ocr_test,
            self.params.search_term
        );
        Ok((Size::of_image(&filtered), passing))
    }

    fn to_candidate(word: Word, source_size: Size) -> MatchCandidate {
        MatchCandidate::new(
            word.rect,
            source_size,
            word.confidence as f64,
            MatchDetail::Text {
                text: word.text,
                detection_score: word.detection_score,
            },
        )
    }

    /// The passing word with the highest confidence; the earliest in reading order on ties.
    pub fn find_one(&self, image: &DynamicImage) -> RecogResult<Option<MatchCandidate>> {
        let (size, words) = self.matching_words(image)?;
        let best = words.into_iter().fold(None::<Word>, |best, w| match best {
            Some(b) if b.confidence >= w.confidence => Some(b),
            _ => Some(w),
        });
        Ok(best.map(|w| Self::to_candidate(w, size)))
    }

    pub fn find_all(&self, image: &DynamicImage) -> RecogResult<Vec<MatchCandidate>> {
        let (size, words) = self.matching_words(image)?;
        Ok(words
            .into_iter()
            .map(|w| Self::to_candidate(w, size))
            .collect())
    }
}
