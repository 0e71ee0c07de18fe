// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Crawl Engine
 * One bounded long-running task per target: fetch, observe, score, adapt
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::advisor::AdvisorBridge;
use crate::config::EngineConfig;
use crate::errors::{EngineResult, SessionError};
use crate::http_client::ShapedClient;
use crate::store::Store;

pub mod session;

use session::CrawlSession;

/// Crawl mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Map the target by following discovered links
    Explore,
    /// Issue requests without exploratory navigation
    Observe,
    /// Explore until a goal predicate is satisfied
    Achieve,
}

/// Request to start a crawl session against one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub target_id: String,
    pub seed_url: String,
    pub mode: CrawlMode,
    pub goal: Option<String>,
    pub max_duration_secs: Option<u64>,
    pub max_iterations: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    fn is_live(&self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Running | SessionStatus::Paused
        )
    }
}

/// Cooperative control signal delivered over a watch channel. The loop
/// observes it at the top of each iteration and at every delay wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionControl {
    Run,
    Pause,
    Stop,
}

pub(crate) struct SessionHandle {
    pub target_id: String,
    pub status: Arc<RwLock<SessionStatus>>,
    pub control: watch::Sender<SessionControl>,
}

/// The crawl engine: owns the in-memory session registry and spawns one
/// task per active session. Sessions are ephemeral; a crash terminates
/// them and targets return to their last recorded status.
pub struct CrawlEngine {
    store: Arc<dyn Store>,
    advisor: Arc<AdvisorBridge>,
    client: Arc<ShapedClient>,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl CrawlEngine {
    /// Build the engine. The configuration is validated here; a session is
    /// never started on a config that fails validation.
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> EngineResult<Self> {
        config.validate_startup()?;
        let advisor = AdvisorBridge::new(config.advisor.clone())?;
        Self::with_advisor(store, config, advisor)
    }

    /// Build the engine around a caller-supplied advisor bridge.
    pub fn with_advisor(
        store: Arc<dyn Store>,
        config: EngineConfig,
        advisor: AdvisorBridge,
    ) -> EngineResult<Self> {
        config.validate_startup()?;
        let client = Arc::new(ShapedClient::new(&config)?);

        Ok(Self {
            store,
            advisor: Arc::new(advisor),
            client,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Start a session. At most one live session may exist per target.
    pub async fn start(&self, request: CrawlRequest) -> EngineResult<String> {
        // The target must exist before a session runs against it
        self.store.get_target(&request.target_id).await?;

        let mut sessions = self.sessions.write().await;

        for handle in sessions.values() {
            if handle.target_id == request.target_id && handle.status.read().await.is_live() {
                return Err(SessionError::AlreadyRunning {
                    target_id: request.target_id.clone(),
                }
                .into());
            }
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let status = Arc::new(RwLock::new(SessionStatus::Starting));
        let (control_tx, control_rx) = watch::channel(SessionControl::Run);

        let session = CrawlSession::new(
            session_id.clone(),
            request.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.advisor),
            Arc::clone(&self.client),
            Arc::clone(&status),
            control_rx,
        );

        sessions.insert(
            session_id.clone(),
            SessionHandle {
                target_id: request.target_id.clone(),
                status: Arc::clone(&status),
                control: control_tx,
            },
        );
        drop(sessions);

        info!(
            session_id = %session_id,
            target_id = %request.target_id,
            mode = ?request.mode,
            "Crawl session starting"
        );

        tokio::spawn(async move {
            session.run().await;
        });

        Ok(session_id)
    }

    /// Pause a running session. The loop parks at its next control check.
    pub async fn pause(&self, session_id: &str) -> EngineResult<()> {
        self.signal(session_id, SessionControl::Pause).await
    }

    /// Resume a paused session.
    pub async fn resume(&self, session_id: &str) -> EngineResult<()> {
        self.signal(session_id, SessionControl::Run).await
    }

    /// Stop a session. Resources are released within one iteration
    /// boundary; partial logs stay in the store.
    pub async fn stop(&self, session_id: &str) -> EngineResult<()> {
        self.signal(session_id, SessionControl::Stop).await
    }

    pub async fn session_status(&self, session_id: &str) -> EngineResult<SessionStatus> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(session_id).ok_or(SessionError::NotFound {
            session_id: session_id.to_string(),
        })?;
        let status = *handle.status.read().await;
        Ok(status)
    }

    /// Whether the advisor bridge has live credentials.
    pub fn advisor_is_live(&self) -> bool {
        self.advisor.is_live()
    }

    async fn signal(&self, session_id: &str, command: SessionControl) -> EngineResult<()> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(session_id).ok_or(SessionError::NotFound {
            session_id: session_id.to_string(),
        })?;

        if handle.control.send(command).is_err() {
            warn!(session_id = %session_id, "Session already terminated, control dropped");
        }
        Ok(())
    }
}
