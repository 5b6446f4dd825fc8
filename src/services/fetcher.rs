use reqwest::header::ACCEPT;
use reqwest::{Client, Url};

/// One transport technique for retrieving bytes from a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Plain GET; accepted only when the response status is ok.
    Direct,
    /// GET with a wildcard accept header; ignores the status code but
    /// rejects responses whose body is empty (nothing usable to return).
    Permissive,
    /// GET through the server-side proxy endpoint.
    Proxy,
}

/// Retrieves binary image data, trying successive transport strategies
/// until one yields usable bytes.
///
/// Each strategy's failure is swallowed until the list is exhausted; the
/// final error wraps the last strategy's failure so provenance survives.
/// Origins listed in `proxy_origins` are routed through the proxy first,
/// which sidesteps cross-origin restrictions on known third-party hosts.
pub struct ResourceFetcher {
    http: Client,
    proxy_endpoint: Option<String>,
    proxy_origins: Vec<String>,
}

impl ResourceFetcher {
    pub fn new(http: Client, proxy_endpoint: Option<String>, proxy_origins: Vec<String>) -> Self {
        Self {
            http,
            proxy_endpoint,
            proxy_origins,
        }
    }

    /// Fetch `url`, returning the first strategy's bytes that succeed.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let order = self.strategy_order(url);
        let attempted = order.len();
        let mut last: Option<FetchError> = None;

        for strategy in order {
            match self.attempt(strategy, url).await {
                Ok(bytes) => {
                    tracing::debug!(url = %url, ?strategy, "resource fetched");
                    return Ok(bytes);
                }
                Err(error) => {
                    tracing::debug!(url = %url, ?strategy, error = %error, "fetch strategy failed");
                    last = Some(error);
                }
            }
        }

        Err(FetchError::Exhausted {
            attempted,
            last: Box::new(last.unwrap_or(FetchError::EmptyBody)),
        })
    }

    /// Strategy order for a URL. Proxy-preferred hosts try the proxy first;
    /// everything else tries it last, and only when an endpoint is configured.
    fn strategy_order(&self, url: &str) -> Vec<FetchStrategy> {
        let mut order = vec![FetchStrategy::Direct, FetchStrategy::Permissive];
        if self.proxy_endpoint.is_some() {
            if self.prefers_proxy(url) {
                order.insert(0, FetchStrategy::Proxy);
            } else {
                order.push(FetchStrategy::Proxy);
            }
        }
        order
    }

    fn prefers_proxy(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
        else {
            return false;
        };
        self.proxy_origins
            .iter()
            .any(|origin| host == *origin || host.ends_with(&format!(".{origin}")))
    }

    async fn attempt(&self, strategy: FetchStrategy, url: &str) -> Result<Vec<u8>, FetchError> {
        match strategy {
            FetchStrategy::Direct => {
                let response = self.http.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                Ok(response.bytes().await?.to_vec())
            }
            FetchStrategy::Permissive => {
                let response = self.http.get(url).header(ACCEPT, "*/*").send().await?;
                let bytes = response.bytes().await?.to_vec();
                if bytes.is_empty() {
                    return Err(FetchError::EmptyBody);
                }
                Ok(bytes)
            }
            FetchStrategy::Proxy => {
                let endpoint = self
                    .proxy_endpoint
                    .as_deref()
                    .ok_or(FetchError::NoProxyConfigured)?;
                let response = self
                    .http
                    .get(endpoint)
                    .query(&[("url", url)])
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                let bytes = response.bytes().await?.to_vec();
                if bytes.is_empty() {
                    return Err(FetchError::EmptyBody);
                }
                Ok(bytes)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP transport failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("response body was empty")]
    EmptyBody,

    #[error("no proxy endpoint configured")]
    NoProxyConfigured,

    #[error("all {attempted} fetch strategies failed")]
    Exhausted {
        attempted: usize,
        #[source]
        last: Box<FetchError>,
    },
}
