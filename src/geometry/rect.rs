//! Rectangles, sizes and the fractional-rectangle transforms used for cutouts and offsets

use crate::error::{RecogError, RecogResult};
use serde::{Deserialize, Serialize};

/// Width and height of an image or screen, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of_image(image: &image::DynamicImage) -> Self {
        Self::new(image.width(), image.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A sub-pixel coordinate, as produced by keypoint detectors and homographies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle anchored at its upper left corner.
///
/// Fields are signed so that intermediate results (padding, warped corners) can leave the
/// image before being clamped back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle covering the whole of `size`.
    pub fn full(size: Size) -> Self {
        Self::new(0, 0, size.width as i32, size.height as i32)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn location(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Centre point, rounded towards the upper left.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Check if the point lies inside the closed bounds of this rectangle.
    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.x && point.y >= self.y && point.x <= self.right() && point.y <= self.bottom()
    }

    /// Whether the centre of `inner` lies inside the closed bounds of this rectangle.
    pub fn contains_center_of(&self, inner: &Rect) -> bool {
        self.contains_point(inner.center())
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Check if this rectangle is valid (non-zero dimensions)
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Non-negative and fully inside `bounds`.
    pub fn fits_within(&self, bounds: Size) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width >= 0
            && self.height >= 0
            && self.right() <= bounds.width as i32
            && self.bottom() <= bounds.height as i32
    }

    /// Fail with a boundary error unless the rectangle fits inside `bounds`.
    pub fn ensure_within(self, bounds: Size) -> RecogResult<Self> {
        if self.fits_within(bounds) {
            Ok(self)
        } else {
            Err(RecogError::Boundary { rect: self, bounds })
        }
    }
}

/// A rectangle whose components are multipliers of some reference width and height.
///
/// Used as a `cutout` (relative to the screenshot) or an `offset` (relative to an already
/// located element).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionalRectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FractionalRectangle {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from optional components. All absent yields `None`, all present yields the
    /// rectangle, anything in between is rejected.
    pub fn from_parts(
        field: &'static str,
        x: Option<f32>,
        y: Option<f32>,
        width: Option<f32>,
        height: Option<f32>,
    ) -> RecogResult<Option<Self>> {
        match (x, y, width, height) {
            (None, None, None, None) => Ok(None),
            (Some(x), Some(y), Some(width), Some(height)) => {
                let rect = Self::new(x, y, width, height);
                if [x, y, width, height].iter().all(|c| c.is_finite()) {
                    Ok(Some(rect))
                } else {
                    Err(RecogError::config(field, format!("non-finite component in {rect:?}")))
                }
            }
            _ => Err(RecogError::config(
                field,
                "x, y, width and height must be either all set or all unset",
            )),
        }
    }

    /// Parse "x,y,width,height" (e.g. "0.1,0.1,0.5,0.5")
    pub fn parse(field: &'static str, value: &str) -> RecogResult<Self> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(RecogError::config(
                field,
                format!("expected 'x,y,width,height' but was '{value}'"),
            ));
        }
        let mut components = [0.0f32; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f32>()
                .map_err(|e| RecogError::config(field, format!("'{part}': {e}")))?;
        }
        let [x, y, width, height] = components;
        Self::from_parts(field, Some(x), Some(y), Some(width), Some(height))?
            .ok_or_else(|| RecogError::config(field, "empty rectangle"))
    }
}

/// Round half up, so that 0.5 goes to 1 and -0.5 goes to 0.
pub(crate) fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

/// Clamp a single coordinate/extent pair into `[0, bound]`, shrinking the extent by one
/// unit when their sum still overflows.
fn clamp_axis(coord: i32, extent: i32, bound: u32) -> (i32, i32) {
    let bound = bound as i32;
    let coord = coord.clamp(0, bound);
    let mut extent = extent.clamp(0, bound);
    if coord + extent > bound {
        extent -= 1;
    }
    (coord, extent)
}

fn clamp_then_shrink(rect: Rect, bounds: Size) -> RecogResult<Rect> {
    let (x, width) = clamp_axis(rect.x, rect.width, bounds.width);
    let (y, height) = clamp_axis(rect.y, rect.height, bounds.height);
    Rect::new(x, y, width, height).ensure_within(bounds)
}

/// Convert a fractional rectangle into absolute pixels of `reference`.
pub fn to_absolute(reference: Size, fractional: &FractionalRectangle) -> RecogResult<Rect> {
    let w = reference.width as f64;
    let h = reference.height as f64;
    let rect = Rect::new(
        round_half_up(fractional.x as f64 * w),
        round_half_up(fractional.y as f64 * h),
        round_half_up(fractional.width as f64 * w),
        round_half_up(fractional.height as f64 * h),
    );
    clamp_then_shrink(rect, reference)
}

/// Derive a dependent rectangle, using `anchor` as origin and ruler.
pub fn offset_rect(
    anchor: &Rect,
    offset: &FractionalRectangle,
    bounds: Size,
) -> RecogResult<Rect> {
    let aw = anchor.width as f64;
    let ah = anchor.height as f64;
    let rect = Rect::new(
        round_half_up(anchor.x as f64 + offset.x as f64 * aw),
        round_half_up(anchor.y as f64 + offset.y as f64 * ah),
        round_half_up(offset.width as f64 * aw),
        round_half_up(offset.height as f64 * ah),
    );
    clamp_then_shrink(rect, bounds)
}

/// Clamp `rect` into `bounds`, shrinking an overflowing extent by one unit; a rectangle
/// that still does not fit is a boundary error.
pub fn clamp_rect(bounds: Size, rect: &Rect) -> RecogResult<Rect> {
    clamp_then_shrink(*rect, bounds)
}

/// Lenient clamp for detector boxes: whatever still overflows after clamp-then-shrink is
/// pinched off, so the result always fits.
pub fn fit_rect(bounds: Size, rect: &Rect) -> Rect {
    let (x, mut width) = clamp_axis(rect.x, rect.width, bounds.width);
    let (y, mut height) = clamp_axis(rect.y, rect.height, bounds.height);
    if x + width > bounds.width as i32 {
        width = bounds.width as i32 - x;
    }
    if y + height > bounds.height as i32 {
        height = bounds.height as i32 - y;
    }
    Rect::new(x, y, width, height)
}

/// An independent copy of the `rect` region of `image`.
pub fn cutout(image: &image::DynamicImage, rect: &Rect) -> RecogResult<image::DynamicImage> {
    let rect = rect.ensure_within(Size::of_image(image))?;
    Ok(image.crop_imm(
        rect.x as u32,
        rect.y as u32,
        rect.width as u32,
        rect.height as u32,
    ))
}
