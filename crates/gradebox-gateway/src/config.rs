//! Gateway endpoints and broker selection.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::error::GatewayError;
use crate::Result;

/// Default gateway used when `GRADEBOX_GATEWAY_URL` is not set
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.gradebox.dev";
/// Default per-request timeout for uploads and publishes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const BROKER_PREFIX: &str = "GRADEBOX_BROKER_";

/// Gateway configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Base URL for blob uploads, log streams and the default broker
    pub endpoint: Url,
    /// Bearer token sent with every request (optional)
    pub token: Option<String>,
    /// Broker endpoints keyed by lowercase server architecture
    pub brokers: BTreeMap<String, Url>,
    /// Timeout for unary requests. Log streams are not bounded by it.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a config for a single gateway endpoint
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            token: None,
            brokers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set authentication token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Route jobs for `arch` to a dedicated broker
    pub fn with_broker(mut self, arch: &str, endpoint: &str) -> Result<Self> {
        self.brokers
            .insert(arch.to_lowercase(), Url::parse(endpoint)?);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create from process environment variables
    ///
    /// Reads:
    /// - GRADEBOX_GATEWAY_URL (optional, default: `DEFAULT_GATEWAY_URL`)
    /// - GRADEBOX_GATEWAY_TOKEN (optional)
    /// - GRADEBOX_GATEWAY_TIMEOUT_SECS (optional, default: 300)
    /// - GRADEBOX_BROKER_<ARCH> (optional, one per architecture)
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit variable list
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();

        let endpoint = vars
            .get("GRADEBOX_GATEWAY_URL")
            .map(String::as_str)
            .unwrap_or(DEFAULT_GATEWAY_URL);
        let mut config = Self::new(endpoint)?;

        if let Some(token) = vars.get("GRADEBOX_GATEWAY_TOKEN").filter(|t| !t.is_empty()) {
            config.token = Some(token.clone());
        }
        if let Some(raw) = vars.get("GRADEBOX_GATEWAY_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                GatewayError::Config(format!("GRADEBOX_GATEWAY_TIMEOUT_SECS is not a number: {}", raw))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        for (name, value) in &vars {
            if let Some(arch) = name.strip_prefix(BROKER_PREFIX) {
                if !arch.is_empty() {
                    config = config.with_broker(arch, value)?;
                }
            }
        }
        Ok(config)
    }

    /// Broker endpoint for `server_arch`, falling back to the gateway itself
    pub fn broker_endpoint(&self, server_arch: Option<&str>) -> &Url {
        server_arch
            .and_then(|arch| self.brokers.get(&arch.to_lowercase()))
            .unwrap_or(&self.endpoint)
    }
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn url_for(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GatewayError::InvalidEndpoint(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
