// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Crawl Engine Integration Tests
 * End-to-end scenarios against a mock origin: cold start, challenge
 * adaptation, blocked-target advisor consultation, session control
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use naamio_engine::advisor::{
    AdvisorBridge, ContentBlock, LlmProvider, LlmResponse, Message, ToolDefinition,
};
use naamio_engine::config::{AdvisorConfig, EngineConfig};
use naamio_engine::dna::BehavioralDna;
use naamio_engine::engine::{CrawlEngine, CrawlMode, CrawlRequest, SessionStatus};
use naamio_engine::errors::{EngineError, SessionError};
use naamio_engine::store::{MemoryStore, Store};
use naamio_engine::types::{
    DnaSnapshot, EventType, GreenLightStatus, RequestLog, Target, TargetStatus,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seeded(store: &MemoryStore, url: &str) -> Target {
    let target = Target::new(url);
    store.create_target(&target).await.unwrap();
    target
}

fn request_for(target: &Target, max_iterations: u64) -> CrawlRequest {
    CrawlRequest {
        target_id: target.id.clone(),
        seed_url: target.url.clone(),
        mode: CrawlMode::Explore,
        goal: None,
        max_duration_secs: Some(120),
        max_iterations: Some(max_iterations),
    }
}

async fn wait_until_settled(
    engine: &CrawlEngine,
    session_id: &str,
    timeout: Duration,
) -> SessionStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = engine.session_status(session_id).await.unwrap();
        if matches!(status, SessionStatus::Completed | SessionStatus::Failed) {
            return status;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("session did not settle within {timeout:?}, last status {status:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ---------------------------------------------------------------------------
// Scenario: cold start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cold_start_births_dna_and_reaches_yellow() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let target = seeded(&store, &server.uri()).await;

    let engine =
        CrawlEngine::new(store.clone() as Arc<dyn Store>, EngineConfig::default()).unwrap();
    let session_id = engine.start(request_for(&target, 1)).await.unwrap();

    let status = wait_until_settled(&engine, &session_id, Duration::from_secs(30)).await;
    assert_eq!(status, SessionStatus::Completed);

    // Initial DNA v1.0.0 exists and is the single active snapshot
    let active = store.get_active_dna(&target.id).await.unwrap().unwrap();
    assert_eq!(active.version, "1.0.0");
    assert!(active.parent_id.is_none());
    let lineage = store.get_dna_lineage(&target.id).await.unwrap();
    assert_eq!(lineage.iter().filter(|s| s.is_active).count(), 1);

    // Request logged with a clean 200
    let logs = store.recent_request_logs(&target.id, 20).await.unwrap();
    assert!(!logs.is_empty());
    let first = logs.last().unwrap();
    assert_eq!(first.response_status, Some(200));
    assert!(!first.was_blocked);
    assert!(!first.challenge_detected);

    // Milestone event for the first success, +10 trust
    let events = store.learning_events(&target.id).await;
    let milestone = events
        .iter()
        .find(|e| e.event_type == EventType::Milestone)
        .expect("milestone event");
    assert_eq!(milestone.title, "First successful request");
    assert_eq!(milestone.trust_impact, 10);

    // Target advanced: trust >= 25, green light YELLOW, learning
    let reloaded = store.get_target(&target.id).await.unwrap();
    assert!(reloaded.trust_score >= 25);
    assert_eq!(reloaded.green_light_status, GreenLightStatus::Yellow);
    assert_eq!(reloaded.status, TargetStatus::Learning);
    assert!(reloaded.last_seen.is_some());
    assert_eq!(
        reloaded.current_dna_id.as_deref(),
        Some(active.id.as_str())
    );

    // A green-light state row was appended
    assert!(!store.green_light_history(&target.id).await.is_empty());
}

// ---------------------------------------------------------------------------
// Scenario: challenge adaptation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_challenge_widens_delay_range_in_new_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(403).set_body_string("please complete the challenge"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let target = seeded(&store, &server.uri()).await;

    let engine =
        CrawlEngine::new(store.clone() as Arc<dyn Store>, EngineConfig::default()).unwrap();
    let session_id = engine.start(request_for(&target, 1)).await.unwrap();
    wait_until_settled(&engine, &session_id, Duration::from_secs(30)).await;

    // The 403 was classified as an unknown challenge
    let logs = store.recent_request_logs(&target.id, 20).await.unwrap();
    let challenged = logs.last().unwrap();
    assert_eq!(challenged.response_status, Some(403));
    assert!(challenged.challenge_detected);
    assert_eq!(challenged.challenge_type.as_deref(), Some("unknown"));
    assert!(challenged.was_blocked);

    // Challenge learning event with -5 trust impact
    let events = store.learning_events(&target.id).await;
    let challenge = events
        .iter()
        .find(|e| e.event_type == EventType::Challenge)
        .expect("challenge event");
    assert_eq!(challenge.trust_impact, -5);
    assert_eq!(challenge.challenge_solved, Some(false));

    // The local adaptation produced a child snapshot with widened pacing
    let lineage = store.get_dna_lineage(&target.id).await.unwrap();
    assert!(lineage.len() >= 2, "expected a mutated snapshot");
    let active = lineage.iter().find(|s| s.is_active).unwrap();
    assert!(active.parent_id.is_some());
    let dna = BehavioralDna::from_json(&active.dna_json).unwrap();
    let default = BehavioralDna::default_profile();
    assert!(dna.timing.delay_range.min_ms >= default.timing.delay_range.min_ms + 500);
    assert!(dna.timing.delay_range.max_ms >= default.timing.delay_range.max_ms + 1_000);

    // A challenged cold target does not rise past YELLOW
    let reloaded = store.get_target(&target.id).await.unwrap();
    assert!(reloaded.green_light_status <= GreenLightStatus::Yellow);
}

// ---------------------------------------------------------------------------
// Scenario: blocked target consults the (offline) advisor
// ---------------------------------------------------------------------------

/// Seed a degraded profile and a hostile request history so the computed
/// score stays below the YELLOW threshold: navigation is denied and the
/// loop falls back to advisor consultation.
async fn seed_degraded_history(store: &MemoryStore, target: &Target) {
    let mut dna = BehavioralDna::default_profile();
    dna.network.ja3_hash = None;
    dna.network.http_version = "1.1".to_string();
    dna.network.header_order.clear();
    dna.timing.delay_range.min_ms = 100;
    dna.timing.delay_range.max_ms = 200;

    let snapshot = DnaSnapshot {
        id: uuid::Uuid::new_v4().to_string(),
        target_id: target.id.clone(),
        version: "1.0.0".to_string(),
        dna_json: dna.to_json().unwrap(),
        parent_id: None,
        is_active: true,
        created_at: Utc::now(),
    };
    store.create_dna_snapshot(&snapshot).await.unwrap();

    // A window of bursty blocked requests: fingerprint-flagged, rate
    // limited, blacklisted, slow
    for i in 0..20 {
        let mut log = RequestLog::new(
            &target.id,
            Some(snapshot.id.clone()),
            "GET",
            format!("{}/probe/{i}", target.url),
            serde_json::json!({}),
        );
        log.created_at = Utc::now() - chrono::Duration::milliseconds(250 - i * 10);
        log.response_status = Some(429);
        log.was_blocked = true;
        log.challenge_detected = true;
        log.challenge_type = Some("unknown".to_string());
        log.block_reason = Some("tls fingerprint mismatch, ip_blacklist".to_string());
        log.timing_ms = Some(20_000);
        store.append_request_log(&log).await.unwrap();
    }
}

#[tokio::test]
async fn test_red_target_skips_navigation_and_uses_local_adaptation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bot detected"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let target = seeded(&store, &server.uri()).await;
    seed_degraded_history(&store, &target).await;

    // No API key configured: the advisor serves the mock fallback
    let engine =
        CrawlEngine::new(store.clone() as Arc<dyn Store>, EngineConfig::default()).unwrap();
    assert!(!engine.advisor_is_live());

    let session_id = engine.start(request_for(&target, 1)).await.unwrap();
    wait_until_settled(&engine, &session_id, Duration::from_secs(30)).await;

    let reloaded = store.get_target(&target.id).await.unwrap();
    assert_eq!(reloaded.green_light_status, GreenLightStatus::Red);

    // Exactly one request was issued this iteration: navigation denied
    // means no exploratory sub-request
    let logs = store.recent_request_logs(&target.id, 20).await.unwrap();
    let session_logs: Vec<_> = logs.iter().filter(|l| !l.url.contains("/probe/")).collect();
    assert_eq!(session_logs.len(), 1);

    // Local adaptation ran; mock advisor mutations were not applied, so
    // the only mutation event is the medium-risk pacing widening
    let events = store.learning_events(&target.id).await;
    let mutations: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::Mutation)
        .collect();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].trust_impact, 0);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::Challenge && e.trust_impact == -5));
}

// ---------------------------------------------------------------------------
// Scenario: a live advisor proposes a mutation the engine applies
// ---------------------------------------------------------------------------

/// Advisor backend that always answers with one low-risk network mutation
/// and an `adapt` strategy, the way a live model consultation would.
struct CannedAdvisor;

#[async_trait::async_trait]
impl LlmProvider for CannedAdvisor {
    async fn chat(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> anyhow::Result<LlmResponse> {
        Ok(LlmResponse {
            content: vec![
                ContentBlock::Text {
                    text: "Language header disagrees with the advertised locale.".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "tool_0".to_string(),
                    name: "suggest_dna_mutation".to_string(),
                    input: serde_json::json!({
                        "gene": "network",
                        "change": { "headers": [["Accept-Language", "en-US"]] },
                        "reason": "align the language header with the advertised locale",
                        "confidence": 0.8,
                        "riskLevel": "low"
                    }),
                },
                ContentBlock::ToolUse {
                    id: "tool_1".to_string(),
                    name: "determine_strategy".to_string(),
                    input: serde_json::json!({
                        "action": "adapt",
                        "reason": "profile correction in flight"
                    }),
                },
            ],
            stop_reason: Some("tool_use".to_string()),
        })
    }

    fn name(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        "claude-sonnet-4-5"
    }
}

#[tokio::test]
async fn test_live_advisor_mutation_is_applied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bot detected"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let target = seeded(&store, &server.uri()).await;
    seed_degraded_history(&store, &target).await;

    let advisor =
        AdvisorBridge::with_provider(Arc::new(CannedAdvisor), AdvisorConfig::default()).unwrap();
    let engine = CrawlEngine::with_advisor(
        store.clone() as Arc<dyn Store>,
        EngineConfig::default(),
        advisor,
    )
    .unwrap();
    assert!(engine.advisor_is_live());

    let session_id = engine.start(request_for(&target, 1)).await.unwrap();
    let status = wait_until_settled(&engine, &session_id, Duration::from_secs(30)).await;
    assert_eq!(status, SessionStatus::Completed);

    // Lineage: seeded 1.0.0 -> local pacing 1.0.1 -> advisor network 1.0.2,
    // each child pointing at the snapshot that was active when it was made
    let lineage = store.get_dna_lineage(&target.id).await.unwrap();
    assert_eq!(lineage.len(), 3);
    let active = lineage.iter().find(|s| s.is_active).unwrap();
    assert_eq!(active.version, "1.0.2");
    assert_eq!(active.parent_id.as_deref(), Some(lineage[1].id.as_str()));
    assert_eq!(lineage[1].parent_id.as_deref(), Some(lineage[0].id.as_str()));

    // The advisor's patch landed on the network gene only; the local
    // pacing widening from the challenge survives untouched
    let dna = BehavioralDna::from_json(&active.dna_json).unwrap();
    assert_eq!(dna.network.header("Accept-Language"), Some("en-US"));
    assert_eq!(dna.timing.delay_range.min_ms, 600);
    assert_eq!(dna.timing.delay_range.max_ms, 1_200);

    // The low-risk advisor mutation carries +5 trust, next to the
    // medium-risk local widening at 0
    let events = store.learning_events(&target.id).await;
    let advisor_mutation = events
        .iter()
        .find(|e| e.event_type == EventType::Mutation && e.trust_impact == 5)
        .expect("advisor mutation event");
    assert_eq!(advisor_mutation.title, "Mutated network gene");
    assert_eq!(advisor_mutation.mcp_confidence, Some(0.8));
    assert_eq!(
        advisor_mutation.dna_version_id.as_deref(),
        Some(active.id.as_str())
    );
}

// ---------------------------------------------------------------------------
// Session control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_one_session_per_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let target = seeded(&store, &server.uri()).await;

    let engine =
        CrawlEngine::new(store.clone() as Arc<dyn Store>, EngineConfig::default()).unwrap();
    let session_id = engine.start(request_for(&target, 50)).await.unwrap();

    let err = engine.start(request_for(&target, 50)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::AlreadyRunning { .. })
    ));

    engine.stop(&session_id).await.unwrap();
    let status = wait_until_settled(&engine, &session_id, Duration::from_secs(30)).await;
    assert_eq!(status, SessionStatus::Completed);

    // A settled session no longer blocks a new one
    engine.start(request_for(&target, 1)).await.unwrap();
}

#[tokio::test]
async fn test_pause_resume_stop_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let target = seeded(&store, &server.uri()).await;

    let engine =
        CrawlEngine::new(store.clone() as Arc<dyn Store>, EngineConfig::default()).unwrap();
    let session_id = engine.start(request_for(&target, 10_000)).await.unwrap();

    engine.pause(&session_id).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if engine.session_status(&session_id).await.unwrap() == SessionStatus::Paused {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never paused"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Pause/resume leaves target state untouched apart from timing
    let before = store.get_target(&target.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let during = store.get_target(&target.id).await.unwrap();
    assert_eq!(before.trust_score, during.trust_score);
    assert_eq!(before.green_light_status, during.green_light_status);
    assert_eq!(before.current_dna_id, during.current_dna_id);

    engine.resume(&session_id).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if engine.session_status(&session_id).await.unwrap() == SessionStatus::Running {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never resumed"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    engine.stop(&session_id).await.unwrap();
    let status = wait_until_settled(&engine, &session_id, Duration::from_secs(30)).await;
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_unknown_session_operations_fail() {
    let store = Arc::new(MemoryStore::new());
    let engine = CrawlEngine::new(store as Arc<dyn Store>, EngineConfig::default()).unwrap();

    let err = engine.stop("no-such-session").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::NotFound { .. })
    ));
    assert!(engine.session_status("no-such-session").await.is_err());
}

#[tokio::test]
async fn test_start_requires_existing_target() {
    let store = Arc::new(MemoryStore::new());
    let engine = CrawlEngine::new(store as Arc<dyn Store>, EngineConfig::default()).unwrap();

    let request = CrawlRequest {
        target_id: "ghost".to_string(),
        seed_url: "https://example.com".to_string(),
        mode: CrawlMode::Observe,
        goal: None,
        max_duration_secs: None,
        max_iterations: Some(1),
    };
    assert!(engine.start(request).await.is_err());
}

// ---------------------------------------------------------------------------
// Scenario: achieve mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_achieve_mode_terminates_on_goal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><a href=\"/wp-admin/\">admin area</a>wp-admin console</body></html>",
        ))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let target = seeded(&store, &server.uri()).await;

    let engine =
        CrawlEngine::new(store.clone() as Arc<dyn Store>, EngineConfig::default()).unwrap();
    let request = CrawlRequest {
        target_id: target.id.clone(),
        seed_url: target.url.clone(),
        mode: CrawlMode::Achieve,
        goal: Some("admin".to_string()),
        max_duration_secs: Some(120),
        max_iterations: Some(5),
    };
    let session_id = engine.start(request).await.unwrap();
    let status = wait_until_settled(&engine, &session_id, Duration::from_secs(60)).await;
    assert_eq!(status, SessionStatus::Completed);

    let events = store.learning_events(&target.id).await;
    let goal = events
        .iter()
        .find(|e| e.event_type == EventType::Milestone && e.title == "Goal achieved")
        .expect("goal milestone");
    assert_eq!(goal.trust_impact, 20);
}
