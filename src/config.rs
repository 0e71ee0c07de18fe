// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Naamio Engine Configuration
 * Recognized options: advisor credentials/model/sampling, request deadline,
 * upstream SOCKS proxy, traffic-inspection backend
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{AdvisorError, EngineError, EngineResult};

/// Minimum capability tier for the advisor model. The gate is a string
/// match on the configured model name; anything outside this family fails
/// fast at session start with `ModelUnsupported`.
const SUPPORTED_MODEL_PREFIXES: &[&str] = &[
    "claude-sonnet-4",
    "claude-opus-4",
    "claude-3-7-sonnet",
    "claude-3-5-sonnet",
];

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_advisor_timeout_secs() -> u64 {
    30
}

fn default_green_light_cache_ttl_secs() -> u64 {
    30
}

fn default_advisor_cache_ttl_secs() -> u64 {
    300
}

fn default_proxy_type() -> String {
    "socks5".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdvisorConfig {
    /// Credentials for the external advisor; absent → offline fallback
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[validate(range(min = 256, max = 32768))]
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; the advisor contract caps this at 0.3
    #[validate(range(min = 0.0, max = 0.3))]
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_advisor_timeout_secs")]
    pub timeout_secs: u64,

    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_advisor_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_advisor_timeout_secs(),
            cache_ttl_secs: default_advisor_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_proxy_type")]
    pub proxy_type: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proxy_type: default_proxy_type(),
            host: String::new(),
            port: 0,
        }
    }
}

impl ProxyConfig {
    /// Render the upstream proxy URL, e.g. `socks5://127.0.0.1:9050`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.proxy_type, self.host, self.port)
    }
}

/// Optional cooperating traffic-inspection backend. When configured, TLS
/// certificate verification is disabled for the outbound client so the
/// inspection proxy can terminate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct InspectionConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl InspectionConfig {
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.port.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    #[validate(nested)]
    #[serde(default)]
    pub advisor: AdvisorConfig,

    /// Per-request deadline in milliseconds
    #[validate(range(min = 1000, max = 300_000))]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[validate(nested)]
    #[serde(default)]
    pub proxy: ProxyConfig,

    #[validate(nested)]
    #[serde(default)]
    pub inspection: InspectionConfig,

    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_green_light_cache_ttl_secs")]
    pub green_light_cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            advisor: AdvisorConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            proxy: ProxyConfig::default(),
            inspection: InspectionConfig::default(),
            green_light_cache_ttl_secs: default_green_light_cache_ttl_secs(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration surface. Refuses an unsupported advisor
    /// model or an unparseable proxy endpoint; sessions must not start on
    /// a config that fails here.
    pub fn validate_startup(&self) -> EngineResult<()> {
        Validate::validate(self)
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        if !model_is_supported(&self.advisor.model) {
            return Err(AdvisorError::ModelUnsupported {
                model: self.advisor.model.clone(),
            }
            .into());
        }

        if self.proxy.enabled {
            if self.proxy.proxy_type != "socks5" {
                return Err(EngineError::Configuration(format!(
                    "unsupported proxy type '{}'",
                    self.proxy.proxy_type
                )));
            }
            if self.proxy.host.is_empty() || self.proxy.port == 0 {
                return Err(EngineError::Configuration(
                    "proxy enabled but host/port incomplete".to_string(),
                ));
            }
            url::Url::parse(&self.proxy.url())
                .map_err(|e| EngineError::Configuration(format!("invalid proxy URL: {e}")))?;
        }

        Ok(())
    }
}

/// Capability gate: accept only model names in the supported family.
pub fn model_is_supported(model: &str) -> bool {
    SUPPORTED_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}
