//! Shared payloads and wire bodies for integration tests.

use std::io::Cursor;

use serde_json::{json, Value};
use tryon_client::models::payload::{ImageFile, SubmissionPayload};

/// Smallest valid PNG the `image` crate can produce.
pub fn tiny_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbaImage::new(1, 1)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Valid payload: person by URL, garment by uploaded file.
pub fn url_person_payload() -> SubmissionPayload {
    SubmissionPayload {
        person_image_url: Some("https://x/a.jpg".to_string()),
        clothing_image: Some(ImageFile::new(tiny_png(), "garment.png")),
        ..Default::default()
    }
}

pub fn history_record(id: &str, url: &str) -> Value {
    json!({"id": id, "imageUrl": url})
}

pub fn history_body(records: Vec<Value>) -> Value {
    json!({
        "success": true,
        "data": records,
        "pagination": {"page": 1, "limit": 20, "total": 100}
    })
}
