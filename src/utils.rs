//! Utility functions for image processing and coordinate handling.

pub mod image_ops;
pub mod safe_cast;

use crate::geometry::Rect;

/// Clip a rectangle to the `width` x `height` image area.
///
/// Returns `None` if nothing of the rectangle remains visible.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn clip_to_image(rect: &Rect, width: u32, height: u32) -> Option<Rect> {
    let clipped = rect.intersect(&Rect::new(0.0, 0.0, width as f32, height as f32));
    if clipped.is_empty() {
        None
    } else {
        Some(clipped)
    }
}

/// Expand a face box by `shift` of its size on every side, make it square
/// and move it back inside the image.
///
/// Landmark regressors are trained on square crops with some context
/// around the detector box.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn refine_box(bbox: &Rect, max_width: u32, max_height: u32, shift: f32) -> Rect {
    let (max_w, max_h) = (max_width as f32, max_height as f32);
    let expanded = bbox.expand(bbox.width * shift, bbox.height * shift);

    let side = expanded.width.max(expanded.height).min(max_w).min(max_h);
    let center = expanded.center();
    let x = (center.x - side / 2.0).clamp(0.0, (max_w - side).max(0.0));
    let y = (center.y - side / 2.0).clamp(0.0, (max_h - side).max(0.0));
    Rect::new(x, y, side, side)
}
