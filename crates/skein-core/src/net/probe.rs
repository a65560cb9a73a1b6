//! HTTP heartbeat probe

use async_trait::async_trait;

use super::ConnectivityProbe;
use crate::error::{Error, Result};
use crate::util::is_http_url;

/// Probes connectivity with a lightweight GET request.
///
/// Any response at all counts as reachable — even an HTTP error status means
/// the network path is up. The monitor applies its own deadline around
/// `check`, so the client is built without one.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Create a probe against the given URL.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !is_http_url(&url) {
            return Err(Error::InvalidInput(format!(
                "heartbeat URL must include http:// or https://, got '{url}'"
            )));
        }
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url,
        })
    }

    /// The URL this probe targets.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> Result<()> {
        self.client.get(&self.url).send().await?;
        Ok(())
    }
}
