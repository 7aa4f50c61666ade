//! Validity flags carried by every derived pipeline entity.
//!
//! A stage that cannot produce a result marks its output invalid with the
//! reason; the next stage sees the flag and marks its own output
//! [`DetectionMiss::UpstreamInvalid`] instead of reading stale coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a pipeline stage produced no usable result for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMiss {
    /// No face candidate in the frame
    NoFace,
    /// Best face candidate scored below the detection threshold
    LowConfidence,
    /// The landmark backend returned nothing for the face
    NoLandmarks,
    /// The eye contour (plus margin) leaves the face region
    EyeOutsideFace,
    /// Eye contour degenerate: profile view or occlusion
    EyeOccluded,
    /// Too little intensity spread inside the eye opening
    LowContrast,
    /// No dark component inside the eye opening
    NoPupilBlob,
    /// Darkest component smaller than a plausible pupil
    BlobTooSmall,
    /// Darkest component larger than a plausible pupil
    BlobTooLarge,
    /// The entity this one derives from was already invalid
    UpstreamInvalid,
    /// Neither eye produced a pupil estimate
    BothEyesInvalid,
}

impl fmt::Display for DetectionMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoFace => "no face",
            Self::LowConfidence => "face confidence below threshold",
            Self::NoLandmarks => "no landmarks",
            Self::EyeOutsideFace => "eye region outside face",
            Self::EyeOccluded => "eye occluded",
            Self::LowContrast => "low contrast",
            Self::NoPupilBlob => "no pupil blob",
            Self::BlobTooSmall => "pupil blob too small",
            Self::BlobTooLarge => "pupil blob too large",
            Self::UpstreamInvalid => "upstream invalid",
            Self::BothEyesInvalid => "both eyes invalid",
        };
        f.write_str(text)
    }
}

/// Validity flag of a derived entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    Valid,
    Invalid(DetectionMiss),
}

impl Validity {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The miss reason, if invalid
    #[must_use]
    pub fn miss(&self) -> Option<DetectionMiss> {
        match self {
            Self::Valid => None,
            Self::Invalid(miss) => Some(*miss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_accessors() {
        assert!(Validity::Valid.is_valid());
        assert_eq!(Validity::Valid.miss(), None);
        let invalid = Validity::Invalid(DetectionMiss::NoFace);
        assert!(!invalid.is_valid());
        assert_eq!(invalid.miss(), Some(DetectionMiss::NoFace));
    }
}
