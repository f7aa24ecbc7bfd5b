//! Overlap handling for candidate boxes: IoU, box merging and non-maximum suppression

use super::rect::Rect;
use serde::{Deserialize, Serialize};

/// A candidate box together with the confidence it was detected with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredBox {
    pub confidence: f32,
    pub rect: Rect,
}

impl ScoredBox {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self { confidence, rect }
    }
}

fn overlap(a: &Rect, b: &Rect) -> (i32, i32) {
    let width = (a.right().min(b.right()) - a.x.max(b.x)).max(0);
    let height = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0);
    (width, height)
}

/// Intersection over union of two boxes.
pub fn iou(a: &Rect, b: &Rect) -> f64 {
    let (iw, ih) = overlap(a, b);
    let intersection = iw as f64 * ih as f64;
    let union = a.area() as f64 + b.area() as f64 - intersection;
    if union <= 0.0 {
        // Two degenerate boxes only overlap if they are the same box
        return if a == b { 1.0 } else { 0.0 };
    }
    intersection / union
}

/// Bounding box of both inputs when their IoU reaches `threshold`.
pub fn merge_by_iou(a: &Rect, b: &Rect, threshold: f64) -> Option<Rect> {
    if iou(a, b) < threshold {
        return None;
    }
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    Some(Rect::new(
        x,
        y,
        a.right().max(b.right()) - x,
        a.bottom().max(b.bottom()) - y,
    ))
}

/// One scan over the list. After a merge the scan resumes at the merged index, since the
/// grown box may now reach boxes it missed before.
fn merge_pass(boxes: &mut Vec<ScoredBox>, threshold: f64) -> bool {
    let mut merged_any = false;
    let mut i = 0;
    while i + 1 < boxes.len() {
        let mut merged = false;
        let mut j = i + 1;
        while j < boxes.len() {
            if let Some(rect) = merge_by_iou(&boxes[i].rect, &boxes[j].rect, threshold) {
                let confidence = boxes[i].confidence.min(boxes[j].confidence);
                boxes.remove(j);
                boxes[i] = ScoredBox::new(confidence, rect);
                merged = true;
                break;
            }
            j += 1;
        }
        if merged {
            merged_any = true;
        } else {
            i += 1;
        }
    }
    merged_any
}

/// Merge overlapping boxes in place until no pair reaches `threshold`.
///
/// A merged box keeps the lower of its constituents' confidences.
pub fn merge_overlapping(boxes: &mut Vec<ScoredBox>, threshold: f64) {
    // A later merge can grow a box into one at an earlier index, hence the outer loop
    while merge_pass(boxes, threshold) {}
}

/// Greedy non-maximum suppression.
///
/// Boxes below `score_threshold` are ignored. Returns the indices of the kept boxes,
/// highest confidence first.
pub fn non_max_suppression(
    boxes: &[ScoredBox],
    score_threshold: f32,
    nms_threshold: f32,
) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..boxes.len())
        .filter(|&i| boxes[i].confidence >= score_threshold)
        .collect();
    indices.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for &i in &indices {
        let suppressed = keep
            .iter()
            .any(|&k| iou(&boxes[k].rect, &boxes[i].rect) > nms_threshold as f64);
        if !suppressed {
            keep.push(i);
        }
    }
    keep
}
