//! Image filters applied before matching

use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

const BINARY_THRESHOLD: u8 = 127;
const ADAPTIVE_SIGMA: f32 = 2.0;
const ADAPTIVE_OFFSET: i16 = 2;
const GAUSSIAN_SIGMA: f32 = 1.0;
const MORPH_RADIUS: u8 = 1;
const CANNY_LOW: f32 = 40.0;

/// A single image transformation. Lists of filters run in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFilter {
    Gray,
    /// 3x3 normalised box blur
    BoxBlur,
    GaussianBlur,
    /// Binary threshold at 127
    SimpleBinaryThreshold,
    /// Gaussian-weighted local mean threshold
    AdaptiveBinaryThreshold,
    OtsuBinaryThreshold,
    MorphErode,
    MorphDilate,
    MorphOpen,
    MorphClose,
    /// Canny edge map, edges white on black
    CannyContours,
    Negative,
}

impl ImageFilter {
    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        match self {
            ImageFilter::Gray => DynamicImage::ImageLuma8(image.to_luma8()),
            ImageFilter::BoxBlur => image.filter3x3(&[1.0 / 9.0; 9]),
            ImageFilter::GaussianBlur => image.blur(GAUSSIAN_SIGMA),
            ImageFilter::SimpleBinaryThreshold => {
                gray_op(image, |g| binary(&g, |_, _, v| v > BINARY_THRESHOLD))
            }
            ImageFilter::AdaptiveBinaryThreshold => gray_op(image, |g| adaptive_threshold(&g)),
            ImageFilter::OtsuBinaryThreshold => gray_op(image, |g| {
                let level = imageproc::contrast::otsu_level(&g);
                binary(&g, |_, _, v| v > level)
            }),
            ImageFilter::MorphErode => gray_op(image, |g| {
                imageproc::morphology::erode(&g, Norm::LInf, MORPH_RADIUS)
            }),
            ImageFilter::MorphDilate => gray_op(image, |g| {
                imageproc::morphology::dilate(&g, Norm::LInf, MORPH_RADIUS)
            }),
            ImageFilter::MorphOpen => gray_op(image, |g| {
                imageproc::morphology::open(&g, Norm::LInf, MORPH_RADIUS)
            }),
            ImageFilter::MorphClose => gray_op(image, |g| {
                imageproc::morphology::close(&g, Norm::LInf, MORPH_RADIUS)
            }),
            ImageFilter::CannyContours => gray_op(image, |g| {
                imageproc::edges::canny(&g, CANNY_LOW, CANNY_LOW * 2.0)
            }),
            ImageFilter::Negative => {
                let mut negative = image.clone();
                negative.invert();
                negative
            }
        }
    }
}

/// Run `filters` over `image` in order. An empty list yields an unmodified copy.
pub fn apply_filters(image: &DynamicImage, filters: &[ImageFilter]) -> DynamicImage {
    let mut current = image.clone();
    for filter in filters {
        log::trace!("Applying filter {filter:?}");
        current = filter.apply(&current);
    }
    current
}

fn gray_op(image: &DynamicImage, op: impl FnOnce(GrayImage) -> GrayImage) -> DynamicImage {
    DynamicImage::ImageLuma8(op(image.to_luma8()))
}

fn binary(gray: &GrayImage, keep: impl Fn(u32, u32, u8) -> bool) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0];
        Luma([if keep(x, y, value) { 255 } else { 0 }])
    })
}

fn adaptive_threshold(gray: &GrayImage) -> GrayImage {
    let mean = imageproc::filter::gaussian_blur_f32(gray, ADAPTIVE_SIGMA);
    binary(gray, |x, y, value| {
        value as i16 > mean.get_pixel(x, y)[0] as i16 - ADAPTIVE_OFFSET
    })
}
