use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle states of a generation job as reported by the service.
///
/// `pending` and `processing` are non-terminal; `completed` and `failed`
/// terminate the job. Any other wire string is a protocol violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Structured error envelope carried inside status and submission responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// One server-side generation task tracked by the client.
///
/// Created on submission, mutated only by status responses, discarded once
/// consumed. Never persisted.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub status_description: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<ErrorBody>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            status_description: None,
            result_url: None,
            error: None,
        }
    }

    /// Fold one status response into the job, returning the parsed status.
    ///
    /// Fields already known (result URL, error) are kept unless the response
    /// carries a replacement.
    pub fn apply(&mut self, response: &StatusResponse) -> Result<JobStatus, strum::ParseError> {
        let status = JobStatus::from_str(&response.status)?;
        self.status = status;
        self.status_description = response
            .status_description
            .clone()
            .or_else(|| response.message.clone());
        if response.image_url.is_some() {
            self.result_url = response.image_url.clone();
        }
        if response.error.is_some() {
            self.error = response.error.clone();
        }
        Ok(status)
    }
}

/// Wire shape of `GET /api/tryon/status/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// Wire shape of a 202 submission acknowledgement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    pub job_id: String,
}

/// Wire shape of the legacy synchronous success body.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacySyncBody {
    pub status: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Wire shape of a non-2xx submission failure body.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error_message: Option<ErrorBody>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_vocabulary_parses() {
        assert_eq!(JobStatus::from_str("pending").unwrap(), JobStatus::Pending);
        assert_eq!(JobStatus::from_str("processing").unwrap(), JobStatus::Processing);
        assert_eq!(JobStatus::from_str("completed").unwrap(), JobStatus::Completed);
        assert_eq!(JobStatus::from_str("failed").unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        assert!(JobStatus::from_str("archived").is_err());
        assert!(JobStatus::from_str("COMPLETED").is_err());
        assert!(JobStatus::from_str("").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_apply_keeps_known_fields() {
        let mut job = Job::new("j-1");

        let first = StatusResponse {
            status: "processing".to_string(),
            status_description: Some("rendering garment".to_string()),
            message: None,
            image_url: Some("https://r/1.png".to_string()),
            error: None,
        };
        assert_eq!(job.apply(&first).unwrap(), JobStatus::Processing);
        assert_eq!(job.result_url.as_deref(), Some("https://r/1.png"));

        let second = StatusResponse {
            status: "completed".to_string(),
            status_description: None,
            message: Some("done".to_string()),
            image_url: None,
            error: None,
        };
        assert_eq!(job.apply(&second).unwrap(), JobStatus::Completed);
        // URL from the earlier response survives
        assert_eq!(job.result_url.as_deref(), Some("https://r/1.png"));
        assert_eq!(job.status_description.as_deref(), Some("done"));
    }

    #[test]
    fn test_apply_rejects_unknown_status() {
        let mut job = Job::new("j-1");
        let response = StatusResponse {
            status: "archived".to_string(),
            status_description: None,
            message: None,
            image_url: None,
            error: None,
        };
        assert!(job.apply(&response).is_err());
    }
}
