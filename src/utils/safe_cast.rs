//! Checked numeric conversions between pixel coordinate types

use crate::{Error, Result};

/// Safely convert usize to u32 with overflow checking
///
/// # Errors
///
/// Returns an error if the value exceeds `u32::MAX`
pub fn usize_to_u32(value: usize) -> Result<u32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in u32")))
}

/// Safely convert f32 to u32 with bounds checking
///
/// # Errors
///
/// Returns an error if the value is not finite, negative or above `u32::MAX`
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn f32_to_u32(value: f32) -> Result<u32> {
    if value.is_finite() && value >= 0.0 && value <= u32::MAX as f32 {
        Ok(value as u32)
    } else {
        Err(Error::InvalidInput(format!(
            "Value {value} cannot be safely converted to u32"
        )))
    }
}

/// Clamp and convert f32 to u32 for pixel coordinates
#[must_use]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn f32_to_u32_clamp(value: f32, min: u32, max: u32) -> u32 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };

    if !value.is_finite() {
        return min;
    }

    let clamped = value.clamp(min as f32, max as f32);
    (clamped as u32).clamp(min, max)
}

/// Convert a pixel count to f32 for ratio arithmetic
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn count_to_f32(value: usize) -> f32 {
    value as f32
}
