// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Context envelope handed to the advisor.
//!
//! Bundles a target summary, the active DNA, recent observations and
//! learning events, and the current challenge if one is in progress. The
//! sha256 digest over the serialized envelope keys the short-TTL response
//! cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dna::BehavioralDna;
use crate::types::{GreenLightStatus, Target, TargetStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Blocked,
    Challenge,
    Success,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Blocked => "blocked",
            ObservationKind::Challenge => "challenge",
            ObservationKind::Success => "success",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub kind: ObservationKind,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

/// A learning event as the advisor sees it: type and outcome only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_type: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeContext {
    pub challenge_type: String,
    pub difficulty: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestQuickView {
    pub url: String,
    pub status: Option<i32>,
    pub was_blocked: bool,
    pub timing_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSummary {
    pub url: String,
    pub status: TargetStatus,
    pub green_light_status: GreenLightStatus,
    pub trust_score: i32,
    pub dna_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorContext {
    pub target: TargetSummary,
    pub dna: BehavioralDna,
    pub observations: Vec<Observation>,
    pub recent_events: Vec<EventSummary>,
    pub current_challenge: Option<ChallengeContext>,
    pub last_request: Option<RequestQuickView>,
}

impl AdvisorContext {
    pub fn new(target: &Target, dna: BehavioralDna, dna_version: String) -> Self {
        Self {
            target: TargetSummary {
                url: target.url.clone(),
                status: target.status,
                green_light_status: target.green_light_status,
                trust_score: target.trust_score,
                dna_version,
            },
            dna,
            observations: Vec::new(),
            recent_events: Vec::new(),
            current_challenge: None,
            last_request: None,
        }
    }

    /// Cache key: sha256 over the serialized envelope. Timestamps are part
    /// of the digest, so a genuinely fresh situation misses the cache.
    pub fn digest(&self) -> String {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        let hash = Sha256::digest(&serialized);
        hash.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    /// Render the envelope as the user message for the advisor model.
    pub fn render_prompt(&self) -> String {
        let mut prompt = format!(
            "## Target\nurl: {}\nstatus: {}\ngreen light: {}\ntrust score: {}\ndna version: {}\n",
            self.target.url,
            self.target.status.as_str(),
            self.target.green_light_status,
            self.target.trust_score,
            self.target.dna_version,
        );

        prompt.push_str("\n## Current DNA\n");
        prompt.push_str(
            &serde_json::to_string_pretty(&self.dna).unwrap_or_else(|_| "{}".to_string()),
        );

        if !self.observations.is_empty() {
            prompt.push_str("\n\n## Recent observations (oldest first)\n");
            for obs in &self.observations {
                prompt.push_str(&format!(
                    "- [{}] {} ({})\n",
                    obs.kind.as_str(),
                    obs.summary,
                    obs.timestamp.to_rfc3339(),
                ));
            }
        }

        if !self.recent_events.is_empty() {
            prompt.push_str("\n## Recent learning events\n");
            for event in &self.recent_events {
                prompt.push_str(&format!("- {}: {}\n", event.event_type, event.outcome));
            }
        }

        if let Some(ref challenge) = self.current_challenge {
            prompt.push_str(&format!(
                "\n## Active challenge\ntype: {}\ndifficulty: {}\nattempts so far: {}\n",
                challenge.challenge_type, challenge.difficulty, challenge.attempts,
            ));
        }

        if let Some(ref last) = self.last_request {
            prompt.push_str(&format!(
                "\n## Last request\n{} -> {:?} (blocked: {}, {:?} ms)\n",
                last.url, last.status, last.was_blocked, last.timing_ms,
            ));
        }

        prompt.push_str(
            "\nAnalyze the situation and respond with tool calls: propose DNA mutations if \
             the profile needs to change, evaluate the trust position, and decide the strategy.",
        );
        prompt
    }
}
