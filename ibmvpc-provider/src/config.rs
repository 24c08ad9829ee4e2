//! Provider configuration

use std::time::Duration;

use ibmvpc_core::timeouts::Timeouts;
use ibmvpc_core::wait::{DEFAULT_DELAY, DEFAULT_MIN_TIMEOUT};
use thiserror::Error;

/// Default IAM token endpoint
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com/identity/token";
/// Default region
pub const DEFAULT_REGION: &str = "us-south";
/// API version date sent with every request
pub const DEFAULT_API_VERSION: &str = "2024-04-30";

const API_KEY_VARS: &[&str] = &["IC_API_KEY", "IBMCLOUD_API_KEY"];
const REGION_VARS: &[&str] = &["IC_REGION", "IBMCLOUD_REGION"];
const ENDPOINT_VAR: &str = "IBMCLOUD_IS_NG_API_ENDPOINT";
const IAM_ENDPOINT_VAR: &str = "IBMCLOUD_IAM_API_ENDPOINT";

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key is required: set IC_API_KEY or IBMCLOUD_API_KEY")]
    MissingApiKey,

    #[error("Invalid region '{0}'")]
    InvalidRegion(String),

    #[error("Invalid endpoint '{0}': must start with https:// or http://")]
    InvalidEndpoint(String),

    #[error("Invalid API version '{0}': expected YYYY-MM-DD")]
    InvalidApiVersion(String),
}

/// Configuration of the IBM Cloud VPC provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub region: String,
    pub api_key: Option<String>,
    /// VPC API endpoint override; derived from the region when unset
    pub endpoint: Option<String>,
    pub iam_endpoint: String,
    pub api_version: String,
    /// Default operation timeouts, overridable per resource
    pub timeouts: Timeouts,
    /// Wait before the first refresh of every poll
    pub wait_delay: Duration,
    /// Minimum wait between refreshes
    pub wait_min_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            api_key: None,
            endpoint: None,
            iam_endpoint: DEFAULT_IAM_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeouts: Timeouts::default(),
            wait_delay: DEFAULT_DELAY,
            wait_min_timeout: DEFAULT_MIN_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Build a configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(*k).filter(|v| !v.is_empty()))
        };

        let mut config = Self::default();
        if let Some(key) = first(API_KEY_VARS) {
            config.api_key = Some(key);
        }
        if let Some(region) = first(REGION_VARS) {
            config.region = region;
        }
        config.endpoint = first(&[ENDPOINT_VAR]);
        if let Some(iam) = first(&[IAM_ENDPOINT_VAR]) {
            config.iam_endpoint = iam;
        }
        config
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = delay;
        self
    }

    /// Base URL of the VPC API
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.iaas.cloud.ibm.com/v1", self.region),
        }
    }

    /// Check the configuration before any request is made
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingApiKey);
        }

        let region_ok = !self.region.is_empty()
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(ConfigError::InvalidRegion(self.region.clone()));
        }

        for endpoint in self.endpoint.iter().chain(std::iter::once(&self.iam_endpoint)) {
            if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
                return Err(ConfigError::InvalidEndpoint(endpoint.clone()));
            }
        }

        if !is_api_version(&self.api_version) {
            return Err(ConfigError::InvalidApiVersion(self.api_version.clone()));
        }

        Ok(())
    }
}

fn is_api_version(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == 3
        && parts[0].len() == 4
        && parts[1].len() == 2
        && parts[2].len() == 2
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_prefers_first_variable() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("IC_API_KEY", "key-a"),
            ("IBMCLOUD_API_KEY", "key-b"),
            ("IBMCLOUD_REGION", "eu-de"),
        ]));

        assert_eq!(config.api_key.as_deref(), Some("key-a"));
        assert_eq!(config.region, "eu-de");
        assert_eq!(config.base_url(), "https://eu-de.iaas.cloud.ibm.com/v1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_override() {
        let config = ProviderConfig::default()
            .with_api_key("key")
            .with_endpoint("https://private.us-south.iaas.cloud.ibm.com/v1/");
        assert_eq!(
            config.base_url(),
            "https://private.us-south.iaas.cloud.ibm.com/v1"
        );
    }

    #[test]
    fn test_validate_errors() {
        assert_eq!(
            ProviderConfig::default().validate(),
            Err(ConfigError::MissingApiKey)
        );

        let config = ProviderConfig::default()
            .with_api_key("key")
            .with_region("US South");
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidRegion("US South".to_string()))
        );

        let config = ProviderConfig::default()
            .with_api_key("key")
            .with_endpoint("ftp://example.com");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint(_))
        ));

        let mut config = ProviderConfig::default().with_api_key("key");
        config.api_version = "2024-4-30".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidApiVersion(_))
        ));
    }
}
