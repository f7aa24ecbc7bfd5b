//! Rectangle arithmetic shared by every matcher and by the reconciler

pub mod merge;
pub mod rect;

pub use merge::{ScoredBox, iou, merge_by_iou, merge_overlapping, non_max_suppression};
pub use rect::{
    FractionalRectangle, Point, PointF, Rect, Size, clamp_rect, cutout, fit_rect, offset_rect,
    to_absolute,
};
