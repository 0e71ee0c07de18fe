// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Shaped HTTP Client
 * Outbound requests carrying the full DNA header set in mandated order,
 * with optional SOCKS upstream and inspection-proxy TLS bypass
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::dna::BehavioralDna;
use crate::errors::{EngineError, EngineResult, NetworkError};

/// Maximum response body retained for analysis (challenge markers live in
/// the first kilobytes; anything beyond is ballast)
const MAX_BODY_BYTES: usize = 512 * 1024;

/// Optimized connection pool settings
const POOL_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Clone)]
pub struct ShapedResponse {
    pub status: u16,
    pub headers: serde_json::Value,
    pub content_type: Option<String>,
    pub body: String,
    pub timing_ms: i64,
}

/// HTTP client whose requests are shaped by a behavioral DNA: header set
/// and order, user agent, language and encoding all come from the profile.
#[derive(Clone)]
pub struct ShapedClient {
    client: Client,
    timeout: Duration,
}

impl ShapedClient {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);

        let mut builder = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .pool_max_idle_per_host(POOL_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .cookie_store(true);

        if config.proxy.enabled {
            let proxy = reqwest::Proxy::all(config.proxy.url()).map_err(|e| {
                EngineError::Network(NetworkError::ProxyError {
                    reason: e.to_string(),
                })
            })?;
            builder = builder.proxy(proxy);
            debug!(proxy = %config.proxy.url(), "Routing through SOCKS upstream");
        }

        // A cooperating inspection proxy terminates TLS with its own cert;
        // verification must be off for traffic to flow through it
        if config.inspection.is_configured() {
            builder = builder.danger_accept_invalid_certs(true);
            warn!("TLS certificate verification disabled for inspection proxy");
        }

        let client = builder
            .build()
            .context("Failed to build shaped HTTP client")
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Render the DNA's header set in its mandated order. User agent,
    /// language and encoding come from the profile, overriding any
    /// same-named entry in the ordered set.
    pub fn shaped_headers(dna: &BehavioralDna) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(ua) = HeaderValue::from_str(&dna.identity.user_agent) {
            headers.insert(USER_AGENT, ua);
        }

        for name in &dna.network.header_order {
            let Some(value) = dna.network.header(name) else {
                continue;
            };
            let (Ok(header_name), Ok(header_value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                warn!(header = %name, "Skipping malformed DNA header");
                continue;
            };
            headers.insert(header_name, header_value);
        }

        if let Ok(lang) = HeaderValue::from_str(&dna.identity.language) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }
        if let Ok(encoding) = HeaderValue::from_str(&dna.network.accept_encoding) {
            headers.insert(ACCEPT_ENCODING, encoding);
        }

        headers
    }

    /// Request headers as stored on the request log.
    pub fn headers_json(dna: &BehavioralDna) -> serde_json::Value {
        let headers = Self::shaped_headers(dna);
        let map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }

    /// Issue one GET shaped by the DNA, subject to the request deadline.
    pub async fn fetch(&self, url: &str, dna: &BehavioralDna) -> EngineResult<ShapedResponse> {
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .headers(Self::shaped_headers(dna))
            .send()
            .await
            .map_err(|e| self.classify_error(url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let headers_json: serde_json::Map<String, serde_json::Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
                )
            })
            .collect();

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify_error(url, e))?;
        let truncated = &body_bytes[..body_bytes.len().min(MAX_BODY_BYTES)];
        let body = String::from_utf8_lossy(truncated).to_string();

        let timing_ms = started.elapsed().as_millis() as i64;
        debug!(url = %url, status = status, timing_ms = timing_ms, "Shaped request completed");

        Ok(ShapedResponse {
            status,
            headers: serde_json::Value::Object(headers_json),
            content_type,
            body,
            timing_ms,
        })
    }

    fn classify_error(&self, url: &str, err: reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::Network(NetworkError::ConnectionTimeout {
                url: url.to_string(),
                timeout: self.timeout,
            })
        } else if err.is_connect() {
            EngineError::Network(NetworkError::ConnectionRefused {
                url: url.to_string(),
            })
        } else {
            EngineError::Network(NetworkError::Other(err.to_string()))
        }
    }
}
