//! Geolocation probe issued through a running engine

use crate::error::ProbeError;
use crate::proxy::models::{GeolocationRecord, ProxyType};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::time::Duration;

/// Default geolocation endpoint
pub const DEFAULT_GEOLOCATION_URL: &str = "http://ip-api.com/json/";

/// Default total timeout for the probe request
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Looks up the egress location seen through a local proxy port
pub trait LocationProbe: Send + Sync {
    fn probe(&self, port: u16) -> BoxFuture<'_, Result<GeolocationRecord, ProbeError>>;
}

/// Probe that sends one GET to a JSON geolocation service via the engine
#[derive(Debug, Clone)]
pub struct HttpLocationProbe {
    endpoint: String,
    timeout: Duration,
    proxy_type: ProxyType,
}

impl Default for HttpLocationProbe {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEOLOCATION_URL.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            proxy_type: ProxyType::Http,
        }
    }
}

impl HttpLocationProbe {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, proxy_type: ProxyType) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            proxy_type,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build a client whose traffic goes through the engine on `port`
    fn create_client(&self, port: u16) -> Result<Client, ProbeError> {
        let proxy_url = self.proxy_type.local_url(port);
        let build = || -> reqwest::Result<Client> {
            Client::builder()
                .proxy(ReqwestProxy::all(&proxy_url)?)
                .timeout(self.timeout)
                .build()
        };

        build().map_err(|source| ProbeError::Client { proxy_url, source })
    }

    async fn lookup(&self, port: u16) -> Result<GeolocationRecord, ProbeError> {
        let client = self.create_client(port)?;

        let response = client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(ProbeError::Request)?;
        let body = response.bytes().await.map_err(ProbeError::Body)?;

        parse_location(&body)
    }
}

impl LocationProbe for HttpLocationProbe {
    fn probe(&self, port: u16) -> BoxFuture<'_, Result<GeolocationRecord, ProbeError>> {
        self.lookup(port).boxed()
    }
}

/// Decode a geolocation response body, rejecting anything but `"success"`
pub fn parse_location(body: &[u8]) -> Result<GeolocationRecord, ProbeError> {
    let location: GeolocationRecord =
        serde_json::from_slice(body).map_err(|source| ProbeError::Decode {
            body: String::from_utf8_lossy(body).into_owned(),
            source,
        })?;

    if !location.is_success() {
        return Err(ProbeError::Status(location.status));
    }

    Ok(location)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn probe() -> HttpLocationProbe {
        HttpLocationProbe::new(
            "http://geo.invalid/json/",
            Duration::from_secs(2),
            ProxyType::Http,
        )
    }

    #[test]
    fn test_defaults() {
        let probe = HttpLocationProbe::default();
        assert_eq!(probe.endpoint(), DEFAULT_GEOLOCATION_URL);
        assert_eq!(probe.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_success() {
        let location = parse_location(SUCCESS_BODY.as_bytes()).unwrap();
        assert_eq!(location.country, "Netherlands");
        assert_eq!(location.query_address, "198.51.100.4");
    }

    #[test]
    fn test_parse_rejects_non_success_status() {
        let err = parse_location(br#"{"status":"fail","message":"reserved range"}"#).unwrap_err();
        assert!(matches!(err, ProbeError::Status(ref s) if s == "fail"));
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        let err = parse_location(b"<html>not json</html>").unwrap_err();
        match err {
            ProbeError::Decode { body, .. } => assert!(body.contains("not json")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_probe_through_local_proxy() {
        let (port, server) = serve_body(SUCCESS_BODY).await;

        let location = probe().probe(port).await.unwrap();
        assert_eq!(location.city, "Amsterdam");
        assert!(location.is_success());
        server.abort();
    }

    #[tokio::test]
    async fn test_probe_fail_status_through_proxy() {
        let (port, server) = serve_body(r#"{"status":"fail"}"#).await;

        let err = probe().probe(port).await.unwrap_err();
        assert!(matches!(err, ProbeError::Status(_)));
        server.abort();
    }

    #[tokio::test]
    async fn test_probe_against_unrelated_listener() {
        let (port, server) = serve_raw("SSH-2.0-OpenSSH_9.6\r\n".to_string()).await;

        assert!(probe().probe(port).await.is_err());
        server.abort();
    }
}
