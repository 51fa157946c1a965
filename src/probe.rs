//! HTTP reachability probe.
//!
//! An optional input signal for observations: one `HEAD https://<domain>/`
//! whose status code is stored on the observation. A failed probe is logged
//! and leaves the observation untouched.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::error_handling::InitializationError;
use crate::initialization::init_probe_client;

/// Reports the HTTP status a domain answers with, if any.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn status(&self, domain: &str) -> Option<u16>;
}

/// `reqwest`-backed probe.
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self, InitializationError> {
        Ok(ReqwestProbe {
            client: init_probe_client(timeout)?,
        })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn status(&self, domain: &str) -> Option<u16> {
        let url = format!("https://{domain}/");
        match self.client.head(&url).send().await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                debug!("HTTP probe for {domain} failed: {e}");
                None
            }
        }
    }
}
