use serde::Deserialize;

/// How concurrent submissions with identical inputs are treated.
///
/// `Allow` sends every submission to the server as-is. `Coalesce` fingerprints
/// the payload and returns the job id of an identical submission that is still
/// in flight instead of creating a second job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Allow,
    Coalesce,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the generation service (e.g., "https://tryon.example.com")
    pub base_url: String,

    /// Server-side image proxy endpoint for cross-origin asset fetches
    #[serde(default)]
    pub proxy_endpoint: Option<String>,

    /// Hosts whose assets are fetched through the proxy before any direct attempt
    #[serde(default)]
    pub proxy_origins: Vec<String>,

    /// Store domain forwarded as the `shop` query parameter on submissions
    #[serde(default)]
    pub shop: Option<String>,

    /// Locale tag attached to submissions
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Policy for concurrent submissions with identical inputs
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_locale() -> String {
    "en".to_string()
}

impl ClientConfig {
    /// Minimal configuration pointing at a service base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            proxy_endpoint: None,
            proxy_origins: Vec::new(),
            shop: None,
            locale: default_locale(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    /// Load configuration from `TRYON_`-prefixed environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("TRYON_").from_env()
    }
}
