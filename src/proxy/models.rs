//! Data models for verification batches

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Status value the geolocation service reports on success
pub const SUCCESS_STATUS: &str = "success";

/// Protocol spoken by the engine's local inbound listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Socks5,
}

impl ProxyType {
    /// URL scheme handed to the HTTP client. SOCKS names are resolved on the
    /// engine side so DNS goes through the tunnel.
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyType::Http => "http",
            ProxyType::Socks5 => "socks5h",
        }
    }

    /// Local proxy URL for an engine listening on `port`
    pub fn local_url(&self, port: u16) -> String {
        format!("{}://127.0.0.1:{}", self.scheme(), port)
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl std::str::FromStr for ProxyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "socks5" | "socks" => Ok(ProxyType::Socks5),
            other => Err(format!("Invalid proxy type: {}. Use: http, socks5", other)),
        }
    }
}

/// One candidate configuration supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    /// Caller-facing label, usually the share URL
    #[serde(rename = "url")]
    pub public_identifier: String,
    /// Engine-readable configuration file
    #[serde(rename = "jsonFilePath")]
    pub engine_config_location: PathBuf,
    /// Port the engine is expected to listen on
    #[serde(rename = "port")]
    pub listen_port: u16,
}

impl ConfigurationRecord {
    pub fn new(
        public_identifier: impl Into<String>,
        engine_config_location: impl Into<PathBuf>,
        listen_port: u16,
    ) -> Self {
        Self {
            public_identifier: public_identifier.into(),
            engine_config_location: engine_config_location.into(),
            listen_port,
        }
    }
}

/// Egress location reported by the geolocation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GeolocationRecord {
    #[serde(rename = "query")]
    pub query_address: String,
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub region_name: String,
    pub city: String,
    pub status: String,
}

impl GeolocationRecord {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }

    /// Get a short display string for the location
    pub fn short_display(&self) -> String {
        match (self.country_code.is_empty(), self.city.is_empty()) {
            (false, false) => format!("{}, {}", self.city, self.country_code),
            (false, true) => self.country_code.clone(),
            (true, false) => self.city.clone(),
            (true, true) => String::from("Unknown"),
        }
    }
}

impl fmt::Display for GeolocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.city, &self.region_name, &self.country]
            .into_iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            write!(f, "Unknown Location")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// A configuration that carried live traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(rename = "url")]
    pub public_identifier: String,
    pub location: GeolocationRecord,
}

impl VerificationResult {
    pub fn new(public_identifier: String, location: GeolocationRecord) -> Self {
        Self {
            public_identifier,
            location,
        }
    }
}

/// Serialized batch handed in by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchInput {
    #[serde(default)]
    pub configs: Vec<ConfigurationRecord>,
}

/// Serialized batch handed back to the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutput {
    pub outputs: Vec<VerificationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_location() -> GeolocationRecord {
        GeolocationRecord {
            query_address: "203.0.113.7".to_string(),
            country: "Germany".to_string(),
            country_code: "DE".to_string(),
            region: "HE".to_string(),
            region_name: "Hesse".to_string(),
            city: "Frankfurt am Main".to_string(),
            status: SUCCESS_STATUS.to_string(),
        }
    }

    #[test]
    fn test_proxy_type_urls() {
        assert_eq!(ProxyType::Http.local_url(1080), "http://127.0.0.1:1080");
        assert_eq!(ProxyType::Socks5.local_url(1080), "socks5h://127.0.0.1:1080");
        assert_eq!("SOCKS5".parse::<ProxyType>().unwrap(), ProxyType::Socks5);
        assert!("socks4".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_record_uses_host_field_names() {
        let json = r#"{"url":"vless://abc","jsonFilePath":"/tmp/a.json","port":1001}"#;
        let record: ConfigurationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.public_identifier, "vless://abc");
        assert_eq!(record.engine_config_location, PathBuf::from("/tmp/a.json"));
        assert_eq!(record.listen_port, 1001);
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let json = r#"{"url":"x","jsonFilePath":"/tmp/a.json","port":70000}"#;
        assert!(serde_json::from_str::<ConfigurationRecord>(json).is_err());
    }

    #[test]
    fn test_batch_input_without_configs_is_empty() {
        let input: BatchInput = serde_json::from_str("{}").unwrap();
        assert!(input.configs.is_empty());
    }

    #[test]
    fn test_location_missing_fields_default_to_empty() {
        let location: GeolocationRecord =
            serde_json::from_str(r#"{"status":"fail","message":"private range"}"#).unwrap();
        assert_eq!(location.status, "fail");
        assert!(location.country.is_empty());
        assert!(!location.is_success());
    }

    #[test]
    fn test_output_serializes_host_field_names() {
        let output = BatchOutput {
            outputs: vec![VerificationResult::new("vmess://x".to_string(), sample_location())],
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["outputs"][0]["url"], "vmess://x");
        assert_eq!(value["outputs"][0]["location"]["query"], "203.0.113.7");
        assert_eq!(value["outputs"][0]["location"]["countryCode"], "DE");
        assert_eq!(value["outputs"][0]["location"]["regionName"], "Hesse");
    }

    #[test]
    fn test_location_display() {
        let location = sample_location();
        assert_eq!(location.short_display(), "Frankfurt am Main, DE");
        assert_eq!(format!("{}", location), "Frankfurt am Main, Hesse, Germany");
        assert_eq!(format!("{}", GeolocationRecord::default()), "Unknown Location");
        assert_eq!(GeolocationRecord::default().short_display(), "Unknown");
    }
}
