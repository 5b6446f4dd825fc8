use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::ClientConfig;
use crate::models::history::ResultRef;
use crate::models::payload::SubmissionPayload;
use crate::services::auth::{AuthClient, TokenProvider};
use crate::services::fetcher::{FetchError, ResourceFetcher};
use crate::services::history::{HistoryClient, RecencyCache};
use crate::services::poller::{CancelHandle, PollError, ProgressUpdate, StatusPoller};
use crate::services::submit::{SubmissionClient, SubmitError, SubmitOutcome, SyncImage};

/// Timeout applied to individual HTTP calls. The poller's attempt budget is
/// the only longer-horizon bound.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregated client holding the authenticated transport, submission,
/// polling, fetching, and history-cache services as instance fields.
///
/// Construct one per service endpoint and share it; all components are safe
/// to use from multiple tasks.
pub struct TryonClient {
    pub auth: Arc<AuthClient>,
    pub submission: SubmissionClient,
    pub poller: StatusPoller,
    pub fetcher: ResourceFetcher,
    pub history: RecencyCache,
}

/// Final outcome of a generation request.
#[derive(Debug, Clone)]
pub enum GeneratedResult {
    /// Resolved through the asynchronous job path.
    Job(ResultRef),
    /// Carried directly in the submission response (legacy path).
    Immediate(SyncImage),
}

impl TryonClient {
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        Self::build(config, None)
    }

    pub fn with_bridge(
        config: ClientConfig,
        bridge: Arc<dyn TokenProvider>,
    ) -> Result<Self, reqwest::Error> {
        Self::build(config, Some(bridge))
    }

    fn build(
        config: ClientConfig,
        bridge: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tryon-client/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()?;

        let auth = Arc::new(match bridge {
            Some(bridge) => AuthClient::with_bridge(http.clone(), bridge),
            None => AuthClient::new(http.clone()),
        });

        let submission = SubmissionClient::new(
            Arc::clone(&auth),
            config.base_url.clone(),
            config.shop.clone(),
            config.locale.clone(),
            config.duplicate_policy,
        );
        let poller = StatusPoller::new(Arc::clone(&auth), config.base_url.clone());
        let fetcher = ResourceFetcher::new(
            http,
            config.proxy_endpoint.clone(),
            config.proxy_origins.clone(),
        );
        let history = RecencyCache::new(HistoryClient::new(
            Arc::clone(&auth),
            config.base_url.clone(),
        ));

        Ok(Self {
            auth,
            submission,
            poller,
            fetcher,
            history,
        })
    }

    /// Submit a payload and drive it to a terminal outcome.
    ///
    /// Progress updates are forwarded to `progress` while the job is in
    /// flight; `cancel` stops the poll loop at the next iteration boundary.
    pub async fn generate(
        &self,
        payload: &SubmissionPayload,
        progress: Option<&UnboundedSender<ProgressUpdate>>,
        cancel: &CancelHandle,
    ) -> Result<GeneratedResult, GenerateError> {
        match self.submission.submit(payload).await? {
            SubmitOutcome::Immediate(image) => Ok(GeneratedResult::Immediate(image)),
            SubmitOutcome::Queued { job_id } => {
                let outcome = self.poller.poll_with(&job_id, progress, cancel).await;
                self.submission.release(&job_id);
                Ok(GeneratedResult::Job(outcome?))
            }
        }
    }

    /// Raw bytes for a generation result, fetching over the network when the
    /// result is only a URL.
    pub async fn download(&self, result: &GeneratedResult) -> Result<Vec<u8>, FetchError> {
        match result {
            GeneratedResult::Immediate(SyncImage::Bytes { data, .. }) => Ok(data.clone()),
            GeneratedResult::Immediate(SyncImage::Url(url)) => self.fetcher.fetch(url).await,
            GeneratedResult::Job(result) => self.fetcher.fetch(&result.source_url).await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Poll(#[from] PollError),
}

impl GenerateError {
    /// Short presentation string for UI-facing callers.
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerateError::Submit(error) => error.user_message(),
            GenerateError::Poll(error) => error.user_message(),
        }
    }
}
