use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;

use crate::models::history::ResultRef;
use crate::models::job::{ErrorBody, Job, JobStatus, StatusResponse};
use crate::services::auth::{AuthClient, AuthError};

/// Hard ceiling on status checks per job (roughly 10 minutes of polling).
pub const MAX_ATTEMPTS: u32 = 200;

/// Delay between status checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Error code reported when a failed job carries no envelope of its own.
const DEFAULT_FAILURE_CODE: &str = "processing_failure";

/// Progress event emitted once per successfully fetched status response,
/// before the status is evaluated.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub attempt: u32,
    /// Raw status string from the wire.
    pub status: String,
    /// Server-supplied human-readable description, when present.
    pub description: Option<String>,
}

/// Cooperative cancellation flag for an in-flight poll loop.
///
/// Cloning hands out another handle to the same flag. A cancelled poll stops
/// issuing requests at the next iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Polls a job's status endpoint until a terminal state is reached.
///
/// Every iteration, successful or not, consumes one attempt from the fixed
/// budget. Transport and decode failures are retried after the interval;
/// protocol violations (unknown status, completed job without a result URL)
/// and authentication failures abort immediately.
pub struct StatusPoller {
    auth: Arc<AuthClient>,
    base_url: String,
    max_attempts: u32,
    interval: Duration,
}

enum AttemptFailure {
    Fatal(PollError),
    Transient(String),
}

impl StatusPoller {
    pub fn new(auth: Arc<AuthClient>, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            base_url: base_url.into(),
            max_attempts: MAX_ATTEMPTS,
            interval: POLL_INTERVAL,
        }
    }

    /// Override the attempt budget and interval. Intended for tests and
    /// callers with unusual latency requirements.
    pub fn with_limits(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.interval = interval;
        self
    }

    /// Poll until terminal, reporting nothing and never cancelling.
    pub async fn poll(&self, job_id: &str) -> Result<ResultRef, PollError> {
        self.poll_with(job_id, None, &CancelHandle::new()).await
    }

    /// Poll until terminal, emitting [`ProgressUpdate`]s to `progress` and
    /// checking `cancel` before each status request.
    pub async fn poll_with(
        &self,
        job_id: &str,
        progress: Option<&UnboundedSender<ProgressUpdate>>,
        cancel: &CancelHandle,
    ) -> Result<ResultRef, PollError> {
        let mut job = Job::new(job_id);

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                tracing::info!(job_id = %job_id, attempt, "polling cancelled");
                return Err(PollError::Cancelled);
            }

            match self.fetch_status(job_id).await {
                Err(AttemptFailure::Fatal(error)) => return Err(error),
                Err(AttemptFailure::Transient(reason)) => {
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        reason = %reason,
                        "status check failed, will retry"
                    );
                }
                Ok(response) => {
                    if let Some(sender) = progress {
                        // Receiver may have gone away; polling continues regardless.
                        let _ = sender.send(ProgressUpdate {
                            attempt,
                            status: response.status.clone(),
                            description: response
                                .status_description
                                .clone()
                                .or_else(|| response.message.clone()),
                        });
                    }

                    let status = job
                        .apply(&response)
                        .map_err(|_| PollError::UnknownStatus(response.status.clone()))?;

                    match status {
                        JobStatus::Completed => {
                            return match job.result_url.as_deref().filter(|url| !url.is_empty()) {
                                Some(url) => {
                                    metrics::counter!("tryon_jobs_completed_total").increment(1);
                                    tracing::info!(job_id = %job_id, attempt, "job completed");
                                    Ok(ResultRef {
                                        id: job.id.clone(),
                                        source_url: url.to_string(),
                                        crop_region: None,
                                    })
                                }
                                None => Err(PollError::MissingResult),
                            };
                        }
                        JobStatus::Failed => {
                            metrics::counter!("tryon_jobs_failed_total").increment(1);
                            let error = job.error.clone().unwrap_or_else(|| ErrorBody {
                                code: DEFAULT_FAILURE_CODE.to_string(),
                                message: "the generation job failed".to_string(),
                            });
                            tracing::warn!(job_id = %job_id, code = %error.code, "job failed");
                            return Err(PollError::JobFailed {
                                code: error.code,
                                message: error.message,
                            });
                        }
                        JobStatus::Pending | JobStatus::Processing => {}
                    }
                }
            }

            if attempt < self.max_attempts {
                sleep(self.interval).await;
            }
        }

        Err(PollError::Timeout {
            attempts: self.max_attempts,
        })
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse, AttemptFailure> {
        let url = format!("{}/api/tryon/status/{}", self.base_url, job_id);
        let response = self
            .auth
            .send(|| self.auth.http().get(&url))
            .await
            .map_err(|error| match error {
                AuthError::AuthRequired { requires_login } => {
                    AttemptFailure::Fatal(PollError::AuthRequired { requires_login })
                }
                AuthError::Network(e) => AttemptFailure::Transient(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            // Includes 404: a just-accepted job may not be visible yet.
            return Err(AttemptFailure::Transient(format!(
                "status endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json::<StatusResponse>()
            .await
            .map_err(|e| AttemptFailure::Transient(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("job failed: {code}: {message}")]
    JobFailed { code: String, message: String },

    #[error("job completed without a result URL")]
    MissingResult,

    #[error("unrecognized job status {0:?}")]
    UnknownStatus(String),

    #[error("gave up after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("polling cancelled by caller")]
    Cancelled,

    #[error("authentication required (requires_login: {requires_login})")]
    AuthRequired { requires_login: bool },
}

impl PollError {
    /// Short presentation string for UI-facing callers.
    pub fn user_message(&self) -> &'static str {
        match self {
            PollError::Timeout { .. } => "This is taking longer than expected. Please try again.",
            PollError::AuthRequired { .. } => "Please sign in to continue.",
            PollError::Cancelled => "Generation cancelled.",
            PollError::JobFailed { .. }
            | PollError::MissingResult
            | PollError::UnknownStatus(_) => {
                "Something went wrong while generating your image. Please try again."
            }
        }
    }
}
