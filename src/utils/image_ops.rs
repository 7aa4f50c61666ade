//! Grayscale image operations used by the eye and pupil stages.

use crate::geometry::Rect;
use image::{GrayImage, Luma};

/// Crop a rectangle out of an image, clipped to the image bounds.
///
/// Returns the crop and the whole-pixel rectangle it covers, or `None`
/// when the clipped rectangle is empty.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn crop(image: &GrayImage, rect: &Rect) -> Option<(GrayImage, Rect)> {
    let bounds = Rect::new(0.0, 0.0, image.width() as f32, image.height() as f32);
    let clipped = rect.to_pixel_bounds().intersect(&bounds);
    if clipped.is_empty() {
        return None;
    }
    let (x, y) = (clipped.x as u32, clipped.y as u32);
    let (w, h) = (clipped.width as u32, clipped.height as u32);
    let view = image::imageops::crop_imm(image, x, y, w, h).to_image();
    Some((view, clipped))
}

/// Intensity histogram of the pixels selected by `mask`
#[must_use]
pub fn masked_histogram(image: &GrayImage, mask: &[bool]) -> [usize; 256] {
    let mut histogram = [0usize; 256];
    for (pixel, &selected) in image.pixels().zip(mask.iter()) {
        if selected {
            histogram[usize::from(pixel[0])] += 1;
        }
    }
    histogram
}

/// Intensity at the given fraction of a histogram's cumulative count
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn histogram_percentile(histogram: &[usize; 256], fraction: f32) -> u8 {
    let total: usize = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let rank = ((total as f32 - 1.0) * fraction.clamp(0.0, 1.0)).round() as usize;
    let mut seen = 0;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > rank {
            return value as u8;
        }
    }
    255
}

/// Linear contrast stretch of `value` from `[low, high]` onto `[0, 255]`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn stretch(value: u8, low: u8, high: u8) -> u8 {
    if high <= low {
        return if value > low { 255 } else { 0 };
    }
    let scaled = (f32::from(value) - f32::from(low)) * 255.0 / (f32::from(high) - f32::from(low));
    scaled.round().clamp(0.0, 255.0) as u8
}

/// Apply [`stretch`] to every pixel
#[must_use]
pub fn stretch_image(image: &GrayImage, low: u8, high: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = stretch(pixel[0], low, high);
    }
    out
}

#[derive(Clone, Copy)]
enum Extremum {
    Min,
    Max,
}

/// Separable square-window min/max filter with replicated borders
fn rank_filter(image: &GrayImage, radius: u32, extremum: Extremum) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let pick = |a: u8, b: u8| match extremum {
        Extremum::Min => a.min(b),
        Extremum::Max => a.max(b),
    };

    let mut horizontal = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(w - 1);
            let mut acc = image.get_pixel(lo, y)[0];
            for xx in lo + 1..=hi {
                acc = pick(acc, image.get_pixel(xx, y)[0]);
            }
            horizontal.put_pixel(x, y, Luma([acc]));
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(h - 1);
        for x in 0..w {
            let mut acc = horizontal.get_pixel(x, lo)[0];
            for yy in lo + 1..=hi {
                acc = pick(acc, horizontal.get_pixel(x, yy)[0]);
            }
            out.put_pixel(x, y, Luma([acc]));
        }
    }
    out
}

/// Grayscale dilation (local maximum)
#[must_use]
pub fn dilate(image: &GrayImage, radius: u32) -> GrayImage {
    rank_filter(image, radius, Extremum::Max)
}

/// Grayscale erosion (local minimum)
#[must_use]
pub fn erode(image: &GrayImage, radius: u32) -> GrayImage {
    rank_filter(image, radius, Extremum::Min)
}

/// Grayscale closing: removes dark structures thinner than the window
/// (eyelashes, eyebrow hair) while keeping larger dark regions intact.
#[must_use]
pub fn close(image: &GrayImage, radius: u32) -> GrayImage {
    erode(&dilate(image, radius), radius)
}
