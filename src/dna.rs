// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Behavioral DNA
 * Versioned request profiles: identity, timing, network, interaction,
 * capabilities, temporal
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::{DnaError, EngineResult};

// ============================================================================
// Genes
// ============================================================================

/// The five mutable genes. `temporal` exists in the DNA but is not a
/// mutation site; proposals naming it (or anything else) are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gene {
    Identity,
    Timing,
    Network,
    Interaction,
    Capabilities,
}

impl Gene {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gene::Identity => "identity",
            Gene::Timing => "timing",
            Gene::Network => "network",
            Gene::Interaction => "interaction",
            Gene::Capabilities => "capabilities",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "identity" => Ok(Gene::Identity),
            "timing" => Ok(Gene::Timing),
            "network" => Ok(Gene::Network),
            "interaction" => Ok(Gene::Interaction),
            "capabilities" => Ok(Gene::Capabilities),
            other => Err(DnaError::UnknownGene {
                gene: other.to_string(),
            }
            .into()),
        }
    }
}

/// Browser identity surface presented to the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityGene {
    pub user_agent: String,
    pub viewport: String,
    pub timezone: String,
    pub language: String,
    pub platform: String,
    pub color_depth: u32,
    pub device_memory: u32,
    pub hardware_concurrency: u32,
}

/// Pacing descriptors. `delay_range` bounds the inter-request delay in
/// milliseconds and is the primary self-throttling lever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingGene {
    pub reading_speed: String,
    pub typing_speed: String,
    pub click_pattern: String,
    pub scroll_pattern: String,
    pub delay_range: DelayRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Wire-level shape: headers in a mandated order, TLS fingerprint label,
/// HTTP version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkGene {
    /// Name → value; emission order comes from `header_order`
    pub headers: Vec<(String, String)>,
    pub header_order: Vec<String>,
    pub tls_fingerprint: String,
    pub http_version: String,
    pub accept_encoding: String,
    pub ja3_hash: Option<String>,
}

impl NetworkGene {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Page-interaction model used when a browser context is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionGene {
    pub mouse_movement: String,
    pub scroll_speed: String,
    pub click_precision: String,
    pub reading_time_strategy: String,
    pub tab_switching: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesGene {
    pub javascript: bool,
    pub cookies: bool,
    pub local_storage: bool,
    pub captcha_solver: bool,
    pub altcha_solver: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalGene {
    pub session_duration_range: (u64, u64),
    pub time_of_day_policy: String,
    pub day_of_week_policy: String,
}

// ============================================================================
// DNA
// ============================================================================

/// The full behavioral profile. Stored in the wire as an opaque JSON blob;
/// in memory it is strongly shaped. Mutations are shallow merges over a
/// single gene, never deep merges of the whole structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralDna {
    pub identity: IdentityGene,
    pub timing: TimingGene,
    pub network: NetworkGene,
    pub interaction: InteractionGene,
    pub capabilities: CapabilitiesGene,
    pub temporal: TemporalGene,
}

impl BehavioralDna {
    /// The fixed v1.0.0 starting profile: a current Chrome on Windows,
    /// conservative pacing, no solver capabilities.
    pub fn default_profile() -> Self {
        Self {
            identity: IdentityGene {
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
                viewport: "1920x1080".to_string(),
                timezone: "Europe/Helsinki".to_string(),
                language: "en-US,en;q=0.9".to_string(),
                platform: "Win32".to_string(),
                color_depth: 24,
                device_memory: 8,
                hardware_concurrency: 8,
            },
            timing: TimingGene {
                reading_speed: "average".to_string(),
                typing_speed: "average".to_string(),
                click_pattern: "natural".to_string(),
                scroll_pattern: "smooth".to_string(),
                delay_range: DelayRange {
                    min_ms: 1_000,
                    max_ms: 3_000,
                },
            },
            network: NetworkGene {
                headers: vec![
                    (
                        "Accept".to_string(),
                        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
                         image/webp,*/*;q=0.8"
                            .to_string(),
                    ),
                    ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                    ("Accept-Encoding".to_string(), "gzip, deflate, br".to_string()),
                    ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
                    ("Sec-Fetch-Dest".to_string(), "document".to_string()),
                    ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
                    ("Sec-Fetch-Site".to_string(), "none".to_string()),
                ],
                header_order: vec![
                    "Accept".to_string(),
                    "Accept-Language".to_string(),
                    "Accept-Encoding".to_string(),
                    "Upgrade-Insecure-Requests".to_string(),
                    "Sec-Fetch-Dest".to_string(),
                    "Sec-Fetch-Mode".to_string(),
                    "Sec-Fetch-Site".to_string(),
                ],
                tls_fingerprint: "chrome120".to_string(),
                http_version: "2".to_string(),
                accept_encoding: "gzip, deflate, br".to_string(),
                ja3_hash: Some("cd08e31494f9531f560d64c695473da9".to_string()),
            },
            interaction: InteractionGene {
                mouse_movement: "bezier".to_string(),
                scroll_speed: "variable".to_string(),
                click_precision: "high".to_string(),
                reading_time_strategy: "content_length".to_string(),
                tab_switching: false,
            },
            capabilities: CapabilitiesGene {
                javascript: true,
                cookies: true,
                local_storage: true,
                captcha_solver: false,
                altcha_solver: false,
            },
            temporal: TemporalGene {
                session_duration_range: (300, 1_800),
                time_of_day_policy: "business_hours".to_string(),
                day_of_week_policy: "weekdays".to_string(),
            },
        }
    }

    pub fn to_json(&self) -> EngineResult<serde_json::Value> {
        serde_json::to_value(self).map_err(Into::into)
    }

    pub fn from_json(value: &serde_json::Value) -> EngineResult<Self> {
        serde_json::from_value(value.clone()).map_err(|e| {
            DnaError::InvalidPayload {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Widen the inter-request delay window. Used both by the local
    /// challenge response (+500/+1000) and the offline advisor fallback.
    pub fn widen_delay_range(&mut self, min_add_ms: u64, max_add_ms: u64) {
        self.timing.delay_range.min_ms += min_add_ms;
        self.timing.delay_range.max_ms += max_add_ms;
        if self.timing.delay_range.max_ms < self.timing.delay_range.min_ms {
            self.timing.delay_range.max_ms = self.timing.delay_range.min_ms;
        }
    }
}

// ============================================================================
// Gene patching
// ============================================================================

/// Key-level difference produced by a gene patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnaDiff {
    pub gene: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl DnaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Apply a shallow patch to a single gene of `dna`, returning the patched
/// DNA and the key-level diff. All other genes are untouched.
///
/// The patch must be a JSON object; its entries replace the gene's fields
/// key by key. A `null` patch value removes nothing (genes have fixed
/// shapes) but is rejected by deserialization if the field is mandatory.
pub fn apply_gene_patch(
    dna: &BehavioralDna,
    gene: Gene,
    patch: &serde_json::Value,
) -> EngineResult<(BehavioralDna, DnaDiff)> {
    let patch_obj = patch.as_object().ok_or_else(|| DnaError::InvalidPayload {
        reason: "gene patch must be a JSON object".to_string(),
    })?;

    let mut dna_value = dna.to_json()?;
    let gene_value = dna_value
        .get_mut(gene.as_str())
        .and_then(|v| v.as_object_mut())
        .ok_or_else(|| DnaError::InvalidPayload {
            reason: format!("gene '{}' missing from DNA", gene.as_str()),
        })?;

    let before_keys: BTreeSet<String> = gene_value.keys().cloned().collect();
    let mut diff = DnaDiff {
        gene: gene.as_str().to_string(),
        ..Default::default()
    };

    for (key, value) in patch_obj {
        match gene_value.get(key) {
            Some(existing) if existing != value => diff.modified.push(key.clone()),
            Some(_) => {}
            None => diff.added.push(key.clone()),
        }
        gene_value.insert(key.clone(), value.clone());
    }

    let after_keys: BTreeSet<String> = gene_value.keys().cloned().collect();
    diff.removed = before_keys.difference(&after_keys).cloned().collect();

    let patched = BehavioralDna::from_json(&dna_value)?;
    Ok((patched, diff))
}

/// Increment the patch component of a semver string: "1.0.3" → "1.0.4".
/// Malformed versions restart at "1.0.1" rather than failing the mutation.
pub fn bump_patch(version: &str) -> String {
    let mut parts: Vec<u64> = version.split('.').filter_map(|p| p.parse().ok()).collect();
    if parts.len() != 3 {
        return "1.0.1".to_string();
    }
    parts[2] += 1;
    format!("{}.{}.{}", parts[0], parts[1], parts[2])
}

pub const INITIAL_VERSION: &str = "1.0.0";
