use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::payload::CropRegion;

/// One previously generated result, as surfaced to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRef {
    pub id: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_region: Option<CropRegion>,
}

/// Wire shape of one record from `GET /api/tryon/customer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub image_url: String,
    #[serde(default)]
    pub crop_region: Option<CropRegion>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Wire shape of `GET /api/tryon/customer`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<HistoryRecord>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}
