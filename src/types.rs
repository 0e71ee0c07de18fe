// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Naamio Core Types
 * Persistent entities: targets, DNA snapshots, learning events, request logs
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Target
// ============================================================================

/// Kind of target under adaptation. Only `web` is active today; the other
/// values are reserved for future modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Web,
    Api,
    Mobile,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Web => "web",
            TargetType::Api => "api",
            TargetType::Mobile => "mobile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "web" => Some(TargetType::Web),
            "api" => Some(TargetType::Api),
            "mobile" => Some(TargetType::Mobile),
            _ => None,
        }
    }
}

/// Lifecycle status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Discovering,
    Learning,
    Established,
    Paused,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Discovering => "discovering",
            TargetStatus::Learning => "learning",
            TargetStatus::Established => "established",
            TargetStatus::Paused => "paused",
            TargetStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovering" => Some(TargetStatus::Discovering),
            "learning" => Some(TargetStatus::Learning),
            "established" => Some(TargetStatus::Established),
            "paused" => Some(TargetStatus::Paused),
            "failed" => Some(TargetStatus::Failed),
            _ => None,
        }
    }
}

/// Green-light trust tier. Closed enumeration; the transition table in the
/// scorer is exhaustive over these four values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GreenLightStatus {
    Red,
    Yellow,
    Green,
    Established,
}

impl GreenLightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GreenLightStatus::Red => "RED",
            GreenLightStatus::Yellow => "YELLOW",
            GreenLightStatus::Green => "GREEN",
            GreenLightStatus::Established => "ESTABLISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RED" => Some(GreenLightStatus::Red),
            "YELLOW" => Some(GreenLightStatus::Yellow),
            "GREEN" => Some(GreenLightStatus::Green),
            "ESTABLISHED" => Some(GreenLightStatus::Established),
            _ => None,
        }
    }
}

impl std::fmt::Display for GreenLightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of adaptation. Mutated exclusively by the crawl session that
/// owns the target; other components only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub target_type: TargetType,
    pub status: TargetStatus,
    pub green_light_status: GreenLightStatus,
    /// Aggregate trust score, clamped to [0, 100]
    pub trust_score: i32,
    pub established_at: Option<DateTime<Utc>>,
    /// Ticks accumulated while ESTABLISHED; reset on any demotion
    pub maintained_for: i64,
    pub is_authenticated: bool,
    pub auth_endpoint: Option<String>,
    pub auth_username: Option<String>,
    pub session_cookies: Option<String>,
    pub current_dna_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Target {
    /// Create a fresh target in the discovering state.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            target_type: TargetType::Web,
            status: TargetStatus::Discovering,
            green_light_status: GreenLightStatus::Red,
            trust_score: 0,
            established_at: None,
            maintained_for: 0,
            is_authenticated: false,
            auth_endpoint: None,
            auth_username: None,
            session_cookies: None,
            current_dna_id: None,
            created_at: Utc::now(),
            last_seen: None,
        }
    }
}

/// Partial update for target-mutable fields. Only `Some` fields are applied.
#[derive(Debug, Clone, Default)]
pub struct TargetPatch {
    pub status: Option<TargetStatus>,
    pub green_light_status: Option<GreenLightStatus>,
    pub trust_score: Option<i32>,
    pub established_at: Option<Option<DateTime<Utc>>>,
    pub maintained_for: Option<i64>,
    pub is_authenticated: Option<bool>,
    pub session_cookies: Option<Option<String>>,
    pub current_dna_id: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

// ============================================================================
// DNA snapshot
// ============================================================================

/// An immutable versioned behavioral profile. Snapshots form a forest per
/// target; `parent_id` always points at the snapshot that was active when
/// this one was created. Never mutated or deleted after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnaSnapshot {
    pub id: String,
    pub target_id: String,
    /// Semver string; the patch component increments on mutation
    pub version: String,
    /// Serialized DNA structure (wire form is an opaque JSON blob)
    pub dna_json: serde_json::Value,
    pub parent_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Learning events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Birth,
    Mutation,
    Milestone,
    Challenge,
    Discovery,
    GreenLight,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Birth => "birth",
            EventType::Mutation => "mutation",
            EventType::Milestone => "milestone",
            EventType::Challenge => "challenge",
            EventType::Discovery => "discovery",
            EventType::GreenLight => "green_light",
            EventType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "birth" => Some(EventType::Birth),
            "mutation" => Some(EventType::Mutation),
            "milestone" => Some(EventType::Milestone),
            "challenge" => Some(EventType::Challenge),
            "discovery" => Some(EventType::Discovery),
            "green_light" => Some(EventType::GreenLight),
            "other" => Some(EventType::Other),
            _ => None,
        }
    }
}

/// Append-only audit entry. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningEvent {
    pub id: String,
    pub target_id: String,
    pub dna_version_id: Option<String>,
    pub event_type: EventType,
    pub title: String,
    pub description: String,
    /// Insight text returned by the advisor, when one was consulted
    pub mcp_insight: Option<String>,
    /// Advisor confidence in [0, 1]
    pub mcp_confidence: Option<f64>,
    pub mcp_model: Option<String>,
    pub dna_changes: Option<serde_json::Value>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    /// Signed trust delta attributed to this event
    pub trust_impact: i32,
    pub challenge_type: Option<String>,
    pub challenge_solved: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl LearningEvent {
    pub fn new(
        target_id: impl Into<String>,
        event_type: EventType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_id: target_id.into(),
            dna_version_id: None,
            event_type,
            title: title.into(),
            description: description.into(),
            mcp_insight: None,
            mcp_confidence: None,
            mcp_model: None,
            dna_changes: None,
            before_state: None,
            after_state: None,
            trust_impact: 0,
            challenge_type: None,
            challenge_solved: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_trust_impact(mut self, impact: i32) -> Self {
        self.trust_impact = impact;
        self
    }

    pub fn with_dna_version(mut self, dna_id: impl Into<String>) -> Self {
        self.dna_version_id = Some(dna_id.into());
        self
    }
}

// ============================================================================
// Request logs
// ============================================================================

/// One row per outbound request. Response fields are filled in by exactly
/// one post-creation update when the response completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    pub target_id: String,
    pub dna_id: Option<String>,
    pub method: String,
    pub url: String,
    pub request_headers: serde_json::Value,
    pub body_preview: Option<String>,
    pub response_status: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body_preview: Option<String>,
    pub was_blocked: bool,
    pub block_reason: Option<String>,
    pub challenge_detected: bool,
    pub challenge_type: Option<String>,
    pub timing_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl RequestLog {
    pub fn new(
        target_id: impl Into<String>,
        dna_id: Option<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        request_headers: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_id: target_id.into(),
            dna_id,
            method: method.into(),
            url: url.into(),
            request_headers,
            body_preview: None,
            response_status: None,
            response_headers: None,
            response_body_preview: None,
            was_blocked: false,
            block_reason: None,
            challenge_detected: false,
            challenge_type: None,
            timing_ms: None,
            created_at: Utc::now(),
        }
    }
}

/// Response-side fields applied in the single post-creation update.
#[derive(Debug, Clone, Default)]
pub struct ResponseUpdate {
    pub response_status: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body_preview: Option<String>,
    pub was_blocked: bool,
    pub block_reason: Option<String>,
    pub challenge_detected: bool,
    pub challenge_type: Option<String>,
    pub timing_ms: Option<i64>,
}

// ============================================================================
// Green-light state
// ============================================================================

/// One boolean check inside a signal group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCheck {
    pub name: String,
    pub passed: bool,
}

/// A weighted signal group with its sub-score in [0, 100].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub score: f64,
    pub weight: f64,
    pub checks: Vec<SignalCheck>,
}

/// Outcome of one scorer calculation, persisted when it produced a
/// transition and cached (30 s TTL) for readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreenLightState {
    pub target_id: String,
    pub status: GreenLightStatus,
    pub trust_score: i32,
    pub signals: Vec<Signal>,
    /// max(0, previous − current) × 0.1, reported for telemetry
    pub decay_rate: f64,
    pub established_at: Option<DateTime<Utc>>,
    pub maintained_for: i64,
    pub lost_at: Option<DateTime<Utc>>,
    pub reason_lost: Option<String>,
    pub calculated_at: DateTime<Utc>,
}

// ============================================================================
// Navigation policy
// ============================================================================

/// Capability record derived from the green-light status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationPolicy {
    pub can_navigate: bool,
    /// Upper bound on exploratory request rate; 0.0 when navigation is off,
    /// f64::INFINITY when unrestricted
    pub max_requests_per_sec: f64,
    pub allow_forms: bool,
    pub description: &'static str,
}
