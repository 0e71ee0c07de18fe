// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Naamio Error Types
 * Production-ready error handling with thiserror
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use std::time::Duration;
use thiserror::Error;

/// Main engine error type with comprehensive error variants
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// DNA-related errors
    #[error("DNA error: {0}")]
    Dna(#[from] DnaError),

    /// Advisor-related errors
    #[error("Advisor error: {0}")]
    Advisor(#[from] AdvisorError),

    /// Session-related errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// General errors
    #[error("Engine error: {0}")]
    General(String),
}

/// Network-specific errors with detailed classification
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection timeout after {timeout:?} to {url}")]
    ConnectionTimeout { url: String, timeout: Duration },

    #[error("Connection reset by peer for {url}")]
    ConnectionReset { url: String },

    #[error("Connection refused for {url}")]
    ConnectionRefused { url: String },

    #[error("DNS resolution failed for {host}: {reason}")]
    DnsResolutionFailed { host: String, reason: String },

    #[error("Proxy error: {reason}")]
    ProxyError { reason: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Network error: {0}")]
    Other(String),
}

/// Store-specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Connection pool exhausted: {available}/{max} connections available")]
    PoolExhausted { available: usize, max: usize },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// DNA lifecycle errors
#[derive(Error, Debug)]
pub enum DnaError {
    #[error("No active DNA snapshot for target {target_id}")]
    NoActiveDna { target_id: String },

    #[error("Unknown gene '{gene}'")]
    UnknownGene { gene: String },

    #[error("Invalid DNA payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Advisor bridge errors
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Advisor unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Advisor protocol error in tool '{tool}': {reason}")]
    Protocol { tool: String, reason: String },

    #[error("Model '{model}' does not meet the minimum capability tier")]
    ModelUnsupported { model: String },
}

/// Crawl session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A session is already running for target {target_id}")]
    AlreadyRunning { target_id: String },

    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("Session invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("Repeated store failures ({count} in {window:?}), session aborted")]
    StoreFailureBudgetExceeded { count: u32, window: Duration },
}

impl NetworkError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::ConnectionTimeout { .. } => true,
            NetworkError::ConnectionReset { .. } => true,
            NetworkError::ProxyError { .. } => true,
            NetworkError::ConnectionRefused { .. } => false,
            NetworkError::DnsResolutionFailed { .. } => false,
            NetworkError::InvalidUrl { .. } => false,
            NetworkError::Other(_) => false,
        }
    }
}

impl StoreError {
    /// Check if store error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::ConnectionFailed { .. } => true,
            StoreError::PoolExhausted { .. } => true,
            StoreError::QueryFailed { .. } => true,
            StoreError::TransactionFailed { .. } => false,
            StoreError::NotFound { .. } => false,
            StoreError::ConstraintViolation { .. } => false,
            StoreError::Serialization(_) => false,
        }
    }
}

impl EngineError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Network(e) => e.is_retryable(),
            EngineError::Store(e) => e.is_retryable(),
            EngineError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Convert reqwest errors to our error types
impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            EngineError::Network(NetworkError::ConnectionTimeout {
                url,
                timeout: Duration::from_secs(15),
            })
        } else if err.is_connect() {
            EngineError::Network(NetworkError::ConnectionRefused { url })
        } else {
            EngineError::Network(NetworkError::Other(err.to_string()))
        }
    }
}

/// Convert tokio-postgres errors to our error types
impl From<tokio_postgres::Error> for EngineError {
    fn from(err: tokio_postgres::Error) -> Self {
        EngineError::Store(StoreError::QueryFailed {
            reason: err.to_string(),
        })
    }
}

/// Convert deadpool errors to our error types
impl From<deadpool_postgres::PoolError> for EngineError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        EngineError::Store(StoreError::ConnectionFailed {
            reason: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(StoreError::Serialization(err.to_string()))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
