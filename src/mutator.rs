// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - DNA Mutator
 * Produces new DNA snapshots from gene-level proposals, maintaining the
 * append-only lineage and the learning-event audit trail
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::dna::{apply_gene_patch, bump_patch, BehavioralDna, DnaDiff, Gene, INITIAL_VERSION};
use crate::errors::{DnaError, EngineResult};
use crate::store::Store;
use crate::types::{DnaSnapshot, EventType, LearningEvent};

/// How risky the proposer believes a mutation is. Drives the trust impact
/// attributed to the resulting learning event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    /// Trust delta attributed to a mutation at this risk level
    pub fn trust_impact(&self) -> i32 {
        match self {
            RiskLevel::Low => 5,
            RiskLevel::Medium => 0,
            RiskLevel::High => -5,
        }
    }
}

/// A proposed shallow patch to one gene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationProposal {
    pub gene: Gene,
    /// Shallow patch applied to the gene's fields
    pub change: serde_json::Value,
    pub reason: String,
    /// Proposer confidence in [0, 1]
    pub confidence: f64,
    pub risk_level: RiskLevel,
}

/// Outcome of an applied mutation.
#[derive(Debug, Clone)]
pub struct MutationResult {
    pub snapshot: DnaSnapshot,
    pub dna: BehavioralDna,
    pub diff: DnaDiff,
}

/// Applies mutations against the store. The mutator is the only writer of
/// DNA snapshots; it always uses the currently active snapshot as parent,
/// which keeps the lineage an upward-only DAG.
pub struct DnaMutator {
    store: Arc<dyn Store>,
}

impl DnaMutator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create the version 1.0.0 snapshot for a target from the fixed
    /// default profile and emit the `birth` learning event.
    pub async fn create_initial(&self, target_id: &str) -> EngineResult<MutationResult> {
        let dna = BehavioralDna::default_profile();
        let snapshot = DnaSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            target_id: target_id.to_string(),
            version: INITIAL_VERSION.to_string(),
            dna_json: dna.to_json()?,
            parent_id: None,
            is_active: true,
            created_at: Utc::now(),
        };

        self.store.create_dna_snapshot(&snapshot).await?;

        let event = LearningEvent::new(
            target_id,
            EventType::Birth,
            "Behavioral profile created",
            format!("Initial DNA v{INITIAL_VERSION} activated from the default profile"),
        )
        .with_dna_version(&snapshot.id);
        self.store.append_learning_event(&event).await?;

        info!(target_id = %target_id, "Initial DNA created");

        Ok(MutationResult {
            snapshot,
            dna,
            diff: DnaDiff::default(),
        })
    }

    /// Apply a gene-level mutation to the target's active DNA.
    ///
    /// Deep-clones the active DNA, shallow-merges the patch into the named
    /// gene, bumps the patch version, and atomically swaps activation to
    /// the new snapshot with the previous one as parent.
    pub async fn mutate(
        &self,
        target_id: &str,
        proposal: &MutationProposal,
    ) -> EngineResult<MutationResult> {
        let active = self
            .store
            .get_active_dna(target_id)
            .await?
            .ok_or_else(|| DnaError::NoActiveDna {
                target_id: target_id.to_string(),
            })?;

        let current = BehavioralDna::from_json(&active.dna_json)?;
        let (mutated, diff) = apply_gene_patch(&current, proposal.gene, &proposal.change)?;

        let snapshot = DnaSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            target_id: target_id.to_string(),
            version: bump_patch(&active.version),
            dna_json: mutated.to_json()?,
            parent_id: Some(active.id.clone()),
            is_active: true,
            created_at: Utc::now(),
        };

        self.store.create_dna_snapshot(&snapshot).await?;

        let event = LearningEvent {
            dna_changes: Some(serde_json::to_value(&diff)?),
            before_state: Some(active.dna_json.clone()),
            after_state: Some(snapshot.dna_json.clone()),
            mcp_confidence: Some(proposal.confidence),
            ..LearningEvent::new(
                target_id,
                EventType::Mutation,
                format!("Mutated {} gene", proposal.gene.as_str()),
                proposal.reason.clone(),
            )
        }
        .with_trust_impact(proposal.risk_level.trust_impact())
        .with_dna_version(&snapshot.id);
        self.store.append_learning_event(&event).await?;

        debug!(
            target_id = %target_id,
            gene = proposal.gene.as_str(),
            version = %snapshot.version,
            risk = proposal.risk_level.as_str(),
            "DNA mutation applied"
        );

        Ok(MutationResult {
            snapshot,
            dna: mutated,
            diff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Target;
    use serde_json::json;

    async fn seeded_store() -> (Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let target = Target::new("https://example.com");
        let id = target.id.clone();
        store.create_target(&target).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_create_initial_emits_birth() {
        let (store, target_id) = seeded_store().await;
        let mutator = DnaMutator::new(store.clone() as Arc<dyn Store>);

        let result = mutator.create_initial(&target_id).await.unwrap();
        assert_eq!(result.snapshot.version, "1.0.0");
        assert!(result.snapshot.parent_id.is_none());
        assert!(result.snapshot.is_active);

        let events = store.learning_events(&target_id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Birth);
        assert_eq!(
            events[0].dna_version_id.as_deref(),
            Some(result.snapshot.id.as_str())
        );
    }

    #[tokio::test]
    async fn test_mutate_without_active_dna_fails() {
        let (store, target_id) = seeded_store().await;
        let mutator = DnaMutator::new(store as Arc<dyn Store>);

        let proposal = MutationProposal {
            gene: Gene::Timing,
            change: json!({ "reading_speed": "slow" }),
            reason: "test".to_string(),
            confidence: 0.5,
            risk_level: RiskLevel::Low,
        };

        let err = mutator.mutate(&target_id, &proposal).await.unwrap_err();
        assert!(matches!(
            err,
            crate::errors::EngineError::Dna(DnaError::NoActiveDna { .. })
        ));
    }

    #[tokio::test]
    async fn test_mutation_links_parent_and_bumps_version() {
        let (store, target_id) = seeded_store().await;
        let mutator = DnaMutator::new(store.clone() as Arc<dyn Store>);

        let initial = mutator.create_initial(&target_id).await.unwrap();

        let proposal = MutationProposal {
            gene: Gene::Network,
            change: json!({ "http_version": "1.1" }),
            reason: "downgrade to h1 after fingerprint block".to_string(),
            confidence: 0.8,
            risk_level: RiskLevel::Medium,
        };
        let result = mutator.mutate(&target_id, &proposal).await.unwrap();

        assert_eq!(result.snapshot.version, "1.0.1");
        assert_eq!(
            result.snapshot.parent_id.as_deref(),
            Some(initial.snapshot.id.as_str())
        );
        assert_eq!(result.dna.network.http_version, "1.1");

        // The previous snapshot is deactivated
        let lineage = store.get_dna_lineage(&target_id).await.unwrap();
        assert_eq!(lineage.len(), 2);
        assert_eq!(lineage.iter().filter(|s| s.is_active).count(), 1);
    }

    #[tokio::test]
    async fn test_mutation_conservatism() {
        let (store, target_id) = seeded_store().await;
        let mutator = DnaMutator::new(store.clone() as Arc<dyn Store>);
        let initial = mutator.create_initial(&target_id).await.unwrap();

        let proposal = MutationProposal {
            gene: Gene::Capabilities,
            change: json!({ "captcha_solver": true }),
            reason: "enable solver".to_string(),
            confidence: 0.9,
            risk_level: RiskLevel::High,
        };
        let result = mutator.mutate(&target_id, &proposal).await.unwrap();

        // Only the named gene differs
        assert_ne!(result.dna.capabilities, initial.dna.capabilities);
        assert_eq!(result.dna.identity, initial.dna.identity);
        assert_eq!(result.dna.timing, initial.dna.timing);
        assert_eq!(result.dna.network, initial.dna.network);
        assert_eq!(result.dna.interaction, initial.dna.interaction);
        assert_eq!(result.dna.temporal, initial.dna.temporal);
    }

    #[tokio::test]
    async fn test_risk_level_trust_impacts() {
        let (store, target_id) = seeded_store().await;
        let mutator = DnaMutator::new(store.clone() as Arc<dyn Store>);
        mutator.create_initial(&target_id).await.unwrap();

        for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            let proposal = MutationProposal {
                gene: Gene::Timing,
                change: json!({ "typing_speed": risk.as_str() }),
                reason: "impact probe".to_string(),
                confidence: 0.5,
                risk_level: risk,
            };
            mutator.mutate(&target_id, &proposal).await.unwrap();
        }

        let events = store.learning_events(&target_id).await;
        let impacts: Vec<i32> = events
            .iter()
            .filter(|e| e.event_type == EventType::Mutation)
            .map(|e| e.trust_impact)
            .collect();
        assert_eq!(impacts, vec![5, 0, -5]);
    }
}
