use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use base64::Engine;
use garde::Validate;
use reqwest::multipart;
use reqwest::StatusCode;

use crate::config::DuplicatePolicy;
use crate::models::job::{ErrorEnvelope, LegacySyncBody, SubmitAck};
use crate::models::payload::{ImageFile, SubmissionPayload};
use crate::services::auth::{AuthClient, AuthError};

/// Fixed aspect-ratio hint appended to every submission.
const ASPECT_RATIO: &str = "3:4";

/// Valid range for demo model identifiers.
const DEMO_MODEL_RANGE: std::ops::RangeInclusive<u32> = 1..=8;

/// Outcome of a submission: an async job handle or an immediate result.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// HTTP 202: the job was queued; poll for completion.
    Queued { job_id: String },
    /// Legacy synchronous path: the response body carried the image directly.
    Immediate(SyncImage),
}

/// Image payload from the legacy synchronous response.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncImage {
    Url(String),
    Bytes { data: Vec<u8>, mime_type: String },
}

/// Client for submitting generation jobs.
pub struct SubmissionClient {
    auth: Arc<AuthClient>,
    base_url: String,
    shop: Option<String>,
    locale: String,
    duplicate_policy: DuplicatePolicy,
    in_flight: Mutex<HashMap<u64, String>>,
}

impl SubmissionClient {
    pub fn new(
        auth: Arc<AuthClient>,
        base_url: impl Into<String>,
        shop: Option<String>,
        locale: impl Into<String>,
        duplicate_policy: DuplicatePolicy,
    ) -> Self {
        Self {
            auth,
            base_url: base_url.into(),
            shop,
            locale: locale.into(),
            duplicate_policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Validate and submit a generation request.
    ///
    /// Validation failures are raised before any network call. A 202 response
    /// yields [`SubmitOutcome::Queued`]; any other 2xx body is decoded via the
    /// legacy synchronous path. Non-2xx responses are decoded as a structured
    /// error envelope when possible.
    pub async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmitOutcome, SubmitError> {
        validate_payload(payload)?;

        let fingerprint = payload_fingerprint(payload);
        if self.duplicate_policy == DuplicatePolicy::Coalesce {
            let in_flight = self.in_flight.lock().expect("in-flight lock");
            if let Some(job_id) = in_flight.get(&fingerprint) {
                tracing::debug!(job_id = %job_id, "coalescing duplicate submission");
                metrics::counter!("tryon_submissions_coalesced_total").increment(1);
                return Ok(SubmitOutcome::Queued {
                    job_id: job_id.clone(),
                });
            }
        }

        let url = format!("{}/api/tryon/generate", self.base_url);
        let crop_json = match &payload.crop_region {
            Some(crop) => {
                Some(serde_json::to_string(crop).map_err(|e| SubmitError::Parse(e.to_string()))?)
            }
            None => None,
        };

        // Correlates submission logs before a server-issued job id exists.
        let submission_id = uuid::Uuid::new_v4();
        tracing::info!(submission_id = %submission_id, "submitting generation request");
        metrics::counter!("tryon_submissions_total").increment(1);
        let response = self
            .auth
            .send(|| {
                let mut request = self.auth.http().post(&url);
                if let Some(shop) = &self.shop {
                    request = request.query(&[("shop", shop)]);
                }
                request.multipart(self.build_form(payload, crop_json.as_deref()))
            })
            .await?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            let ack: SubmitAck = response
                .json()
                .await
                .map_err(|e| SubmitError::Parse(e.to_string()))?;
            tracing::info!(submission_id = %submission_id, job_id = %ack.job_id, "generation job queued");
            if self.duplicate_policy == DuplicatePolicy::Coalesce {
                self.in_flight
                    .lock()
                    .expect("in-flight lock")
                    .insert(fingerprint, ack.job_id.clone());
            }
            return Ok(SubmitOutcome::Queued { job_id: ack.job_id });
        }

        if status.is_success() {
            let body: LegacySyncBody = response
                .json()
                .await
                .map_err(|e| SubmitError::Parse(e.to_string()))?;
            let image = match (body.status.as_str(), body.image) {
                ("success", Some(image)) => decode_sync_image(&image)?,
                _ => {
                    return Err(SubmitError::Parse(
                        "2xx response carried neither a job id nor an image".to_string(),
                    ))
                }
            };
            tracing::info!("generation completed synchronously");
            return Ok(SubmitOutcome::Immediate(image));
        }

        metrics::counter!("tryon_submission_failures_total").increment(1);
        let text = response.text().await.unwrap_or_default();
        let envelope = serde_json::from_str::<ErrorEnvelope>(&text)
            .ok()
            .and_then(|e| e.error_message);
        Err(match envelope {
            Some(error) => SubmitError::Remote {
                code: error.code,
                message: error.message,
            },
            None => SubmitError::Remote {
                code: format!("http_{}", status.as_u16()),
                message: format!("generation service returned HTTP {}", status.as_u16()),
            },
        })
    }

    /// Drop the coalescing entry for a job once its outcome has been consumed.
    pub fn release(&self, job_id: &str) {
        self.in_flight
            .lock()
            .expect("in-flight lock")
            .retain(|_, id| id != job_id);
    }

    fn build_form(&self, payload: &SubmissionPayload, crop_json: Option<&str>) -> multipart::Form {
        let mut form = multipart::Form::new();

        if let Some(file) = &payload.person_image {
            form = form.part("personImage", file_part(file));
        }
        if let Some(url) = &payload.person_image_url {
            form = form.text("personImageUrl", url.clone());
        }
        if let Some(demo) = &payload.demo_model_id {
            form = form.text("demoModelId", demo.clone());
        }
        if let Some(file) = &payload.clothing_image {
            form = form.part("clothingImage", file_part(file));
        }
        if let Some(url) = &payload.clothing_image_url {
            form = form.text("clothingImageUrl", url.clone());
        }

        form = form.text("aspectRatio", ASPECT_RATIO);

        if let Some(email) = &payload.customer_email {
            form = form.text("customerEmail", email.clone());
        }
        if let Some(product_id) = &payload.product_id {
            form = form.text("productId", product_id.clone());
        }
        if let Some(crop) = crop_json {
            form = form.text("cropRegion", crop.to_string());
        }
        let locale = payload.locale.clone().unwrap_or_else(|| self.locale.clone());
        form.text("locale", locale)
    }
}

/// Validate a payload without touching the network.
///
/// Enforces field shapes (garde), the person/garment mutual-exclusion rules,
/// the demo identifier format, and that uploaded files are decodable images.
pub fn validate_payload(payload: &SubmissionPayload) -> Result<(), SubmitError> {
    payload
        .validate()
        .map_err(|report| SubmitError::Validation(report.to_string()))?;

    match payload.person_source_count() {
        0 => {
            return Err(SubmitError::Validation(
                "a person reference is required (photo, URL, or demo model)".to_string(),
            ))
        }
        1 => {}
        _ => {
            return Err(SubmitError::Validation(
                "person references are mutually exclusive; set exactly one".to_string(),
            ))
        }
    }

    match payload.garment_source_count() {
        0 => {
            return Err(SubmitError::Validation(
                "a garment reference is required (photo or URL)".to_string(),
            ))
        }
        1 => {}
        _ => {
            return Err(SubmitError::Validation(
                "garment references are mutually exclusive; set exactly one".to_string(),
            ))
        }
    }

    if let Some(demo) = &payload.demo_model_id {
        let valid = demo
            .parse::<u32>()
            .map(|id| DEMO_MODEL_RANGE.contains(&id))
            .unwrap_or(false);
        if !valid {
            return Err(SubmitError::Validation(format!(
                "demo model id {:?} is not in the range {}..={}",
                demo,
                DEMO_MODEL_RANGE.start(),
                DEMO_MODEL_RANGE.end()
            )));
        }
    }

    for (name, file) in [
        ("person image", &payload.person_image),
        ("garment image", &payload.clothing_image),
    ] {
        if let Some(file) = file {
            image::guess_format(&file.bytes)
                .map_err(|_| SubmitError::Validation(format!("{name} is not a supported image")))?;
        }
    }

    Ok(())
}

/// Stable fingerprint over every submission input, for duplicate coalescing.
pub fn payload_fingerprint(payload: &SubmissionPayload) -> u64 {
    let mut hasher = DefaultHasher::new();
    payload.person_image.hash(&mut hasher);
    payload.person_image_url.hash(&mut hasher);
    payload.demo_model_id.hash(&mut hasher);
    payload.clothing_image.hash(&mut hasher);
    payload.clothing_image_url.hash(&mut hasher);
    payload.customer_email.hash(&mut hasher);
    payload.product_id.hash(&mut hasher);
    if let Some(crop) = &payload.crop_region {
        crop.x.to_bits().hash(&mut hasher);
        crop.y.to_bits().hash(&mut hasher);
        crop.width.to_bits().hash(&mut hasher);
        crop.height.to_bits().hash(&mut hasher);
    }
    payload.locale.hash(&mut hasher);
    hasher.finish()
}

fn file_part(file: &ImageFile) -> multipart::Part {
    let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
    match image::guess_format(&file.bytes) {
        // guess_format succeeded during validation, so the mime string is a
        // known-good static value.
        Ok(format) => part
            .mime_str(format.to_mime_type())
            .expect("valid mime string"),
        Err(_) => part,
    }
}

fn decode_sync_image(raw: &str) -> Result<SyncImage, SubmitError> {
    let Some(rest) = raw.strip_prefix("data:") else {
        return Ok(SyncImage::Url(raw.to_string()));
    };
    let (meta, encoded) = rest
        .split_once(',')
        .ok_or_else(|| SubmitError::Parse("malformed data URL in response".to_string()))?;
    let mime_type = meta.strip_suffix(";base64").unwrap_or(meta);
    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| SubmitError::Parse(format!("invalid base64 image data: {e}")))?;
    Ok(SyncImage::Bytes {
        data,
        mime_type: mime_type.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid submission payload: {0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("HTTP transport failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("service rejected the submission: {code}: {message}")]
    Remote { code: String, message: String },

    #[error("could not decode submission response: {0}")]
    Parse(String),
}

impl SubmitError {
    /// Short presentation string for UI-facing callers.
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "Please check the selected images and try again.",
            SubmitError::Auth(AuthError::AuthRequired { .. }) => "Please sign in to continue.",
            SubmitError::Auth(AuthError::Network(_)) | SubmitError::Network(_) => {
                "Connection problem. Please check your network and try again."
            }
            SubmitError::Remote { .. } | SubmitError::Parse(_) => {
                "Something went wrong while generating your image. Please try again."
            }
        }
    }
}
