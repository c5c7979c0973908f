#![cfg(feature = "tor-client")]

//! HTTP client that reaches `.onion` peers through the Tor SOCKS proxy.

use std::time::Duration;

use async_trait::async_trait;

use crate::records::PublicProfile;
use crate::transport::{PeerDirectory, PeerTransport, TransportError, TransportResponse, INFO_PATH};

#[derive(Clone)]
pub struct TorHttpClient {
    client: reqwest::Client,
}

impl TorHttpClient {
    /// Route every request through the SOCKS proxy at `socks_host:socks_port`.
    ///
    /// `socks5h` makes the proxy resolve names, which `.onion` requires.
    pub fn new(socks_host: &str, socks_port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let proxy = reqwest::Proxy::all(format!("socks5h://{}:{}", socks_host, socks_port))
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .proxy(proxy)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client })
    }

    fn url(onion: &str, path: &str) -> String {
        format!("http://{}.onion{}", onion, path)
    }
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connect(e.to_string())
    }
}

#[async_trait]
impl PeerDirectory for TorHttpClient {
    async fn fetch_info(&self, onion: &str) -> Result<PublicProfile, TransportError> {
        let resp = self
            .client
            .get(Self::url(onion, INFO_PATH))
            .send()
            .await
            .map_err(map_reqwest)?;

        if !resp.status().is_success() {
            return Err(TransportError::BadResponse(format!("status={}", resp.status())));
        }

        let body = resp.bytes().await.map_err(map_reqwest)?;
        serde_json::from_slice(&body).map_err(|e| TransportError::BadResponse(e.to_string()))
    }
}

#[async_trait]
impl PeerTransport for TorHttpClient {
    async fn post(
        &self,
        onion: &str,
        path: &str,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    ) -> Result<TransportResponse, TransportError> {
        let mut req = self.client.post(Self::url(onion, path)).body(body);
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp = req.send().await.map_err(map_reqwest)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_reqwest)?;
        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onion_url() {
        assert_eq!(
            TorHttpClient::url("abcdefghijklmnop", "/info"),
            "http://abcdefghijklmnop.onion/info"
        );
    }

    #[test]
    fn test_client_builds_with_socks_proxy() {
        assert!(TorHttpClient::new("127.0.0.1", 9050, Duration::from_secs(60)).is_ok());
    }
}
