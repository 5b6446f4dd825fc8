use garde::Validate;
use serde::{Deserialize, Serialize};

/// An uploaded image attachment: raw bytes plus the original file name.
///
/// The MIME type sent over the wire is derived from the bytes, not from the
/// file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl ImageFile {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
        }
    }
}

/// Crop region applied to the garment source image, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Inputs for one try-on generation request.
///
/// Exactly one person reference (`person_image`, `person_image_url`, or
/// `demo_model_id`) and exactly one garment reference (`clothing_image` or
/// `clothing_image_url`) must be set. Cross-field rules are enforced by
/// [`crate::services::submit::validate_payload`]; the garde attributes here
/// only bound individual field shapes.
#[derive(Debug, Clone, Default, Validate)]
pub struct SubmissionPayload {
    #[garde(skip)]
    pub person_image: Option<ImageFile>,

    #[garde(inner(length(min = 1, max = 2048)))]
    pub person_image_url: Option<String>,

    #[garde(inner(length(min = 1, max = 16)))]
    pub demo_model_id: Option<String>,

    #[garde(skip)]
    pub clothing_image: Option<ImageFile>,

    #[garde(inner(length(min = 1, max = 2048)))]
    pub clothing_image_url: Option<String>,

    #[garde(inner(length(min = 3, max = 320)))]
    pub customer_email: Option<String>,

    #[garde(inner(length(min = 1, max = 128)))]
    pub product_id: Option<String>,

    #[garde(skip)]
    pub crop_region: Option<CropRegion>,

    #[garde(inner(length(min = 2, max = 16)))]
    pub locale: Option<String>,
}

impl SubmissionPayload {
    /// Number of person-reference variants that are set.
    pub fn person_source_count(&self) -> usize {
        [
            self.person_image.is_some(),
            self.person_image_url.is_some(),
            self.demo_model_id.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Number of garment-reference variants that are set.
    pub fn garment_source_count(&self) -> usize {
        [
            self.clothing_image.is_some(),
            self.clothing_image_url.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}
