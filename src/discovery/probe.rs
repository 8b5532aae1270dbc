// src/discovery/probe.rs
//! Single bounded reachability check against a candidate address

use crate::transport::types::parse_thermal_payload;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};

/// Checks one address. Never errors: any failure is simply "not found here".
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, address: &str, timeout: Duration) -> bool;
}

/// Issues one GET and validates the thermal payload shape
pub struct HttpProbe {
    client: Client,
    port: u16,
    path: String,
    grid: (usize, usize),
}

impl HttpProbe {
    pub fn new(port: u16, path: impl Into<String>, grid: (usize, usize)) -> Self {
        Self {
            client: Client::new(),
            port,
            path: path.into(),
            grid,
        }
    }

    pub fn url_for(&self, address: &str) -> String {
        format!("http://{}:{}{}", address, self.port, self.path)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, address: &str, timeout: Duration) -> bool {
        let url = self.url_for(address);
        let request = async {
            let response = self.client.get(&url).timeout(timeout).send().await?;
            response.error_for_status()?.text().await
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(body)) => match parse_thermal_payload(&body, self.grid) {
                Ok(message) => message.frame.is_some(),
                Err(reason) => {
                    debug!(%url, %reason, "Probe response is not a sensor payload");
                    false
                }
            },
            Ok(Err(e)) => {
                trace!(%url, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                trace!(%url, timeout_ms = timeout.as_millis() as u64, "Probe timed out");
                false
            }
        }
    }
}
