// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! In-memory store backend.
//!
//! Implements the full `Store` contract over `RwLock`-guarded maps,
//! enforcing the same invariants as the SQL backend: at most one active
//! DNA snapshot per target, same-target parent references, append-only
//! event and request-log tables. Used by tests and offline runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::{EngineResult, StoreError};
use crate::store::{GreenLightCache, Store};
use crate::types::{
    DnaSnapshot, GreenLightState, LearningEvent, RequestLog, ResponseUpdate, Target, TargetPatch,
};

#[derive(Default)]
struct Tables {
    targets: HashMap<String, Target>,
    snapshots: Vec<DnaSnapshot>,
    events: Vec<LearningEvent>,
    request_logs: Vec<RequestLog>,
    green_light_states: Vec<GreenLightState>,
}

pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    cache: GreenLightCache,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            cache: GreenLightCache::default(),
        }
    }

    /// All learning events for a target, oldest first.
    pub async fn learning_events(&self, target_id: &str) -> Vec<LearningEvent> {
        self.tables
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.target_id == target_id)
            .cloned()
            .collect()
    }

    /// All persisted green-light states for a target, oldest first.
    pub async fn green_light_history(&self, target_id: &str) -> Vec<GreenLightState> {
        self.tables
            .read()
            .await
            .green_light_states
            .iter()
            .filter(|s| s.target_id == target_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_target(&self, target: &Target) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        if tables.targets.contains_key(&target.id) {
            return Err(StoreError::ConstraintViolation {
                constraint: format!("target {} already exists", target.id),
            }
            .into());
        }
        tables.targets.insert(target.id.clone(), target.clone());
        Ok(())
    }

    async fn get_target(&self, id: &str) -> EngineResult<Target> {
        self.tables
            .read()
            .await
            .targets
            .get(id)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound {
                    entity: "target",
                    id: id.to_string(),
                }
                .into()
            })
    }

    async fn update_target_fields(&self, id: &str, patch: &TargetPatch) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        let target = tables.targets.get_mut(id).ok_or(StoreError::NotFound {
            entity: "target",
            id: id.to_string(),
        })?;

        if let Some(status) = patch.status {
            target.status = status;
        }
        if let Some(gls) = patch.green_light_status {
            target.green_light_status = gls;
        }
        if let Some(score) = patch.trust_score {
            target.trust_score = score.clamp(0, 100);
        }
        if let Some(established_at) = patch.established_at {
            target.established_at = established_at;
        }
        if let Some(maintained_for) = patch.maintained_for {
            target.maintained_for = maintained_for;
        }
        if let Some(is_auth) = patch.is_authenticated {
            target.is_authenticated = is_auth;
        }
        if let Some(ref cookies) = patch.session_cookies {
            target.session_cookies = cookies.clone();
        }
        if let Some(ref dna_id) = patch.current_dna_id {
            target.current_dna_id = Some(dna_id.clone());
        }
        if let Some(last_seen) = patch.last_seen {
            target.last_seen = Some(last_seen);
        }
        Ok(())
    }

    async fn get_active_dna(&self, target_id: &str) -> EngineResult<Option<DnaSnapshot>> {
        Ok(self
            .tables
            .read()
            .await
            .snapshots
            .iter()
            .find(|s| s.target_id == target_id && s.is_active)
            .cloned())
    }

    async fn create_dna_snapshot(&self, snapshot: &DnaSnapshot) -> EngineResult<()> {
        let mut tables = self.tables.write().await;

        if !tables.targets.contains_key(&snapshot.target_id) {
            return Err(StoreError::NotFound {
                entity: "target",
                id: snapshot.target_id.clone(),
            }
            .into());
        }

        if let Some(ref parent_id) = snapshot.parent_id {
            let parent_ok = tables
                .snapshots
                .iter()
                .any(|s| &s.id == parent_id && s.target_id == snapshot.target_id);
            if !parent_ok {
                return Err(StoreError::ConstraintViolation {
                    constraint: format!(
                        "parent snapshot {parent_id} missing or belongs to another target"
                    ),
                }
                .into());
            }
        }

        // Activation flip, insertion and current_dna_id repoint are one
        // critical section; readers never observe zero or two actives.
        for s in tables
            .snapshots
            .iter_mut()
            .filter(|s| s.target_id == snapshot.target_id)
        {
            s.is_active = false;
        }
        tables.snapshots.push(snapshot.clone());
        if let Some(target) = tables.targets.get_mut(&snapshot.target_id) {
            target.current_dna_id = Some(snapshot.id.clone());
        }
        Ok(())
    }

    async fn append_learning_event(&self, event: &LearningEvent) -> EngineResult<()> {
        self.tables.write().await.events.push(event.clone());
        Ok(())
    }

    async fn recent_learning_events(
        &self,
        target_id: &str,
        n: usize,
    ) -> EngineResult<Vec<LearningEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<LearningEvent> = tables
            .events
            .iter()
            .filter(|e| e.target_id == target_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(n);
        Ok(events)
    }

    async fn append_request_log(&self, log: &RequestLog) -> EngineResult<()> {
        self.tables.write().await.request_logs.push(log.clone());
        Ok(())
    }

    async fn update_request_log_response(
        &self,
        id: &str,
        update: &ResponseUpdate,
    ) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        let log = tables
            .request_logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(StoreError::NotFound {
                entity: "request_log",
                id: id.to_string(),
            })?;

        log.response_status = update.response_status;
        log.response_headers = update.response_headers.clone();
        log.response_body_preview = update.response_body_preview.clone();
        log.was_blocked = update.was_blocked;
        log.block_reason = update.block_reason.clone();
        log.challenge_detected = update.challenge_detected;
        log.challenge_type = update.challenge_type.clone();
        log.timing_ms = update.timing_ms;
        Ok(())
    }

    async fn recent_request_logs(
        &self,
        target_id: &str,
        n: usize,
    ) -> EngineResult<Vec<RequestLog>> {
        let tables = self.tables.read().await;
        let mut logs: Vec<RequestLog> = tables
            .request_logs
            .iter()
            .filter(|l| l.target_id == target_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(n);
        Ok(logs)
    }

    async fn get_dna_lineage(&self, target_id: &str) -> EngineResult<Vec<DnaSnapshot>> {
        let tables = self.tables.read().await;
        let mut lineage: Vec<DnaSnapshot> = tables
            .snapshots
            .iter()
            .filter(|s| s.target_id == target_id)
            .cloned()
            .collect();
        lineage.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(lineage)
    }

    async fn put_green_light_state(&self, state: &GreenLightState) -> EngineResult<()> {
        self.tables
            .write()
            .await
            .green_light_states
            .push(state.clone());
        self.cache.put(state).await;
        Ok(())
    }

    async fn get_cached_green_light_state(
        &self,
        target_id: &str,
    ) -> EngineResult<Option<GreenLightState>> {
        if let Some(state) = self.cache.get(target_id).await {
            return Ok(Some(state));
        }
        Ok(self
            .tables
            .read()
            .await
            .green_light_states
            .iter()
            .rev()
            .find(|s| s.target_id == target_id)
            .cloned())
    }
}
