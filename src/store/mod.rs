// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Naamio Store Layer
 * Abstract persistence operations consumed by the core
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use crate::errors::EngineResult;
use crate::types::{
    DnaSnapshot, GreenLightState, LearningEvent, RequestLog, ResponseUpdate, Target, TargetPatch,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresStore, PostgresStoreConfig};

/// Persistence operations the core consumes. The concrete backing engine is
/// an implementation concern; the core never sees SQL.
///
/// Contract notes:
/// - `create_dna_snapshot` must atomically deactivate the prior active
///   snapshot for the target, insert the new one, and repoint the target's
///   `current_dna_id`. Either all three happen or none do.
/// - `LearningEvent` and `RequestLog` rows are append-only;
///   `update_request_log_response` is the single permitted post-creation
///   update, filling response-side fields.
/// - `recent_request_logs` returns newest-first.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_target(&self, target: &Target) -> EngineResult<()>;

    async fn get_target(&self, id: &str) -> EngineResult<Target>;

    async fn update_target_fields(&self, id: &str, patch: &TargetPatch) -> EngineResult<()>;

    async fn get_active_dna(&self, target_id: &str) -> EngineResult<Option<DnaSnapshot>>;

    async fn create_dna_snapshot(&self, snapshot: &DnaSnapshot) -> EngineResult<()>;

    async fn append_learning_event(&self, event: &LearningEvent) -> EngineResult<()>;

    async fn recent_learning_events(
        &self,
        target_id: &str,
        n: usize,
    ) -> EngineResult<Vec<LearningEvent>>;

    async fn append_request_log(&self, log: &RequestLog) -> EngineResult<()>;

    async fn update_request_log_response(
        &self,
        id: &str,
        update: &ResponseUpdate,
    ) -> EngineResult<()>;

    async fn recent_request_logs(&self, target_id: &str, n: usize)
        -> EngineResult<Vec<RequestLog>>;

    async fn get_dna_lineage(&self, target_id: &str) -> EngineResult<Vec<DnaSnapshot>>;

    async fn put_green_light_state(&self, state: &GreenLightState) -> EngineResult<()>;

    async fn get_cached_green_light_state(
        &self,
        target_id: &str,
    ) -> EngineResult<Option<GreenLightState>>;
}

/// Short-TTL cache for the latest green-light state per target. A cache,
/// never authoritative; invalidation is implicit by TTL.
#[derive(Clone)]
pub struct GreenLightCache {
    cache: Cache<String, GreenLightState>,
}

impl GreenLightCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn put(&self, state: &GreenLightState) {
        self.cache
            .insert(state.target_id.clone(), state.clone())
            .await;
    }

    pub async fn get(&self, target_id: &str) -> Option<GreenLightState> {
        self.cache.get(target_id).await
    }
}

impl Default for GreenLightCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
