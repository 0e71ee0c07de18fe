// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! The per-target crawl loop.
//!
//! Each iteration: load the active DNA and the recent request window,
//! issue one shaped request, observe and log the response, recompute the
//! green-light state, and either consult the advisor (when navigation is
//! denied) or perform one exploratory sub-request. The loop is strictly
//! sequential; at most one outbound request is in flight per session.

use chrono::Utc;
use rand::Rng;
use scraper::{Html, Selector};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::advisor::{
    AdvisorBridge, AdvisorContext, ChallengeContext, EventSummary, Observation, ObservationKind,
    RequestQuickView,
};
use crate::detection::{inspect_response, Detection};
use crate::dna::{BehavioralDna, DelayRange, Gene};
use crate::errors::{EngineError, EngineResult, SessionError};
use crate::http_client::{ShapedClient, ShapedResponse};
use crate::mutator::{DnaMutator, MutationProposal, RiskLevel};
use crate::retry::{run_retried, RetryPolicy};
use crate::scorer::Scorer;
use crate::store::Store;
use crate::types::{
    EventType, GreenLightStatus, LearningEvent, RequestLog, ResponseUpdate, Target, TargetPatch,
    TargetStatus,
};

use super::{CrawlMode, CrawlRequest, SessionControl, SessionStatus};

/// Recent window consulted by the scorer
const REQUEST_WINDOW: usize = 20;
/// Stored preview length for response bodies
const BODY_PREVIEW_CHARS: usize = 2_000;
/// Store failures beyond this count inside the window fail the session
const STORE_FAILURE_BUDGET: usize = 3;
const STORE_FAILURE_WINDOW: Duration = Duration::from_secs(30);

/// Fixed exploration cycle used when the page yields no links
const EXPLORE_PATHS: &[&str] = &["/", "/blog", "/about", "/contact"];

/// Common goal labels mapped to the marker that satisfies them
const GOAL_PATTERNS: &[(&str, &str)] = &[
    ("admin", "wp-admin"),
    ("login", "login"),
    ("dashboard", "dashboard"),
    ("checkout", "cart"),
];

enum Flow {
    Proceed,
    Stopped,
}

enum Outcome {
    Continue,
    Done(&'static str),
}

struct Observed {
    response: Option<ShapedResponse>,
    detection: Detection,
    url: String,
}

pub(crate) struct CrawlSession {
    id: String,
    request: CrawlRequest,
    store: Arc<dyn Store>,
    advisor: Arc<AdvisorBridge>,
    client: Arc<ShapedClient>,
    mutator: DnaMutator,
    status: Arc<RwLock<SessionStatus>>,
    control: watch::Receiver<SessionControl>,
    retry: RetryPolicy,
    store_failures: VecDeque<Instant>,
    iterations: u64,
    path_cursor: usize,
}

impl CrawlSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        request: CrawlRequest,
        store: Arc<dyn Store>,
        advisor: Arc<AdvisorBridge>,
        client: Arc<ShapedClient>,
        status: Arc<RwLock<SessionStatus>>,
        control: watch::Receiver<SessionControl>,
    ) -> Self {
        let mutator = DnaMutator::new(Arc::clone(&store));
        Self {
            id,
            request,
            store,
            advisor,
            client,
            mutator,
            status,
            control,
            retry: RetryPolicy::default(),
            store_failures: VecDeque::new(),
            iterations: 0,
            path_cursor: 0,
        }
    }

    /// Drive the session to completion. All exit paths settle the session
    /// status; partial logs always survive in the store.
    pub(crate) async fn run(mut self) {
        *self.status.write().await = SessionStatus::Running;
        let result = self.run_loop().await;

        match result {
            Ok(reason) => {
                info!(session_id = %self.id, reason = reason, "Crawl session completed");
                *self.status.write().await = SessionStatus::Completed;
            }
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "Crawl session failed");
                *self.status.write().await = SessionStatus::Failed;
                self.settle_failure(&err).await;
            }
        }
    }

    async fn run_loop(&mut self) -> EngineResult<&'static str> {
        let started = Instant::now();

        loop {
            if matches!(self.control_gate().await, Flow::Stopped) {
                return Ok("stop requested");
            }

            if let Some(max_iterations) = self.request.max_iterations {
                if self.iterations >= max_iterations {
                    return Ok("max iterations reached");
                }
            }
            if let Some(max_duration) = self.request.max_duration_secs {
                if started.elapsed() >= Duration::from_secs(max_duration) {
                    return Ok("max duration elapsed");
                }
            }

            self.iterations += 1;

            match self.iterate().await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Done(reason)) => return Ok(reason),
                Err(err) => {
                    if self.is_fatal(&err) {
                        return Err(err);
                    }
                    if matches!(err, EngineError::Store(_)) {
                        self.record_store_failure()?;
                    }
                    warn!(
                        session_id = %self.id,
                        iteration = self.iterations,
                        error = %err,
                        "Iteration failed, continuing"
                    );
                }
            }
        }
    }

    /// One full iteration of the adaptive loop.
    async fn iterate(&mut self) -> EngineResult<Outcome> {
        let target = self.get_target().await?;

        // First iteration births the profile; afterwards a missing active
        // snapshot is an invariant violation, not a recoverable state
        let (mut dna, mut dna_snapshot_id, mut dna_version) = match self.active_dna().await? {
            Some((dna, id, version)) => (dna, id, version),
            None if self.iterations == 1 => {
                let result = self.mutator.create_initial(&target.id).await?;
                let version = result.snapshot.version.clone();
                (result.dna, result.snapshot.id.clone(), version)
            }
            None => {
                return Err(SessionError::InvariantViolation {
                    reason: format!("no active DNA for target {} after birth", target.id),
                }
                .into())
            }
        };

        let recent = self
            .store
            .recent_request_logs(&target.id, REQUEST_WINDOW)
            .await?;
        let had_prior_success = recent.iter().any(|l| l.response_status == Some(200));

        // Step 2-4: the main shaped request
        let main = self
            .observe_request(
                &target,
                self.request.seed_url.clone(),
                &dna,
                &dna_snapshot_id,
                had_prior_success,
            )
            .await?;

        // Local adaptation: any detected challenge widens the pacing window
        // without waiting for the advisor
        if main.detection.challenge_detected {
            let result = self
                .adapt_pacing_after_challenge(&target, &dna, &main.detection)
                .await?;
            dna = result.0;
            dna_snapshot_id = result.1;
            dna_version = result.2;
        }

        // Step 5: score and persist the new green-light state
        let refreshed = self
            .store
            .recent_request_logs(&target.id, REQUEST_WINDOW)
            .await?;
        let state = Scorer::calculate(&target, &dna, &refreshed, Utc::now());

        self.with_retry("put_green_light_state", || {
            let store = Arc::clone(&self.store);
            let state = state.clone();
            async move { store.put_green_light_state(&state).await }
        })
        .await?;

        let target_status = if state.status == GreenLightStatus::Established {
            TargetStatus::Established
        } else if matches!(
            target.status,
            TargetStatus::Discovering | TargetStatus::Established
        ) {
            TargetStatus::Learning
        } else {
            target.status
        };

        let patch = TargetPatch {
            status: Some(target_status),
            green_light_status: Some(state.status),
            trust_score: Some(state.trust_score),
            established_at: Some(state.established_at),
            maintained_for: Some(state.maintained_for),
            last_seen: Some(Utc::now()),
            ..Default::default()
        };
        self.with_retry("update_target_fields", || {
            let store = Arc::clone(&self.store);
            let id = target.id.clone();
            let patch = patch.clone();
            async move { store.update_target_fields(&id, &patch).await }
        })
        .await?;

        if state.status == GreenLightStatus::Established
            && target.green_light_status != GreenLightStatus::Established
        {
            let event = LearningEvent::new(
                &target.id,
                EventType::GreenLight,
                "Green light established",
                format!(
                    "Trust score {} crossed the establishment threshold",
                    state.trust_score
                ),
            )
            .with_dna_version(&dna_snapshot_id);
            self.append_event(event).await?;
        }

        // Step 6: navigation gate
        let policy = Scorer::navigation_policy(state.status);
        if !policy.can_navigate {
            self.consult_advisor(&target, &dna, &dna_version, &refreshed, &main)
                .await;

            // Cool off for twice the widest configured delay before retrying
            let cooloff = Duration::from_millis(dna.timing.delay_range.max_ms * 2);
            if matches!(self.cancellable_sleep(cooloff).await, Flow::Stopped) {
                return Ok(Outcome::Done("stop requested"));
            }
            return Ok(Outcome::Continue);
        }

        // Step 7: one exploratory sub-request after a human-shaped delay
        let delay = Self::pick_delay(&dna.timing.delay_range);
        if matches!(self.cancellable_sleep(delay).await, Flow::Stopped) {
            return Ok(Outcome::Done("stop requested"));
        }

        let sub_url = self.pick_exploration_url(&target, main.response.as_ref());
        let sub = self
            .observe_request(&target, sub_url, &dna, &dna_snapshot_id, true)
            .await?;

        if sub.detection.challenge_detected {
            self.adapt_pacing_after_challenge(&target, &dna, &sub.detection)
                .await?;
        }

        // Step 8: goal predicate in achieve mode
        if self.request.mode == CrawlMode::Achieve {
            if let Some(ref goal) = self.request.goal {
                for observed in [&main, &sub] {
                    if Self::goal_achieved(goal, observed) {
                        let event = LearningEvent::new(
                            &target.id,
                            EventType::Milestone,
                            "Goal achieved",
                            format!("Goal '{goal}' satisfied at {}", observed.url),
                        )
                        .with_trust_impact(20)
                        .with_dna_version(&dna_snapshot_id);
                        self.append_event(event).await?;
                        return Ok(Outcome::Done("goal achieved"));
                    }
                }
            }
        }

        Ok(Outcome::Continue)
    }

    /// Issue one shaped request against `url`, persist its log, and fill in
    /// the response fields once the response (or failure) is known.
    async fn observe_request(
        &mut self,
        target: &Target,
        url: String,
        dna: &BehavioralDna,
        dna_snapshot_id: &str,
        had_prior_success: bool,
    ) -> EngineResult<Observed> {
        let log = RequestLog::new(
            &target.id,
            Some(dna_snapshot_id.to_string()),
            "GET",
            url.clone(),
            ShapedClient::headers_json(dna),
        );
        let log_id = log.id.clone();

        self.with_retry("append_request_log", || {
            let store = Arc::clone(&self.store);
            let log = log.clone();
            async move { store.append_request_log(&log).await }
        })
        .await?;

        let (response, detection, update) = match self.client.fetch(&url, dna).await {
            Ok(response) => {
                let detection = inspect_response(
                    response.status,
                    response.content_type.as_deref(),
                    &response.body,
                );
                let update = ResponseUpdate {
                    response_status: Some(response.status as i32),
                    response_headers: Some(response.headers.clone()),
                    response_body_preview: Some(truncate(&response.body, BODY_PREVIEW_CHARS)),
                    was_blocked: detection.was_blocked,
                    block_reason: detection.block_reason.clone(),
                    challenge_detected: detection.challenge_detected,
                    challenge_type: detection.challenge_type.clone(),
                    timing_ms: Some(response.timing_ms),
                };
                (Some(response), detection, update)
            }
            Err(err) => {
                // Transient network failure: recorded on the log, scored as
                // a negative signal, the loop continues
                debug!(url = %url, error = %err, "Request failed");
                let update = ResponseUpdate {
                    block_reason: Some(format!("transient: {err}")),
                    ..Default::default()
                };
                (None, Detection::clean(), update)
            }
        };

        self.with_retry("update_request_log_response", || {
            let store = Arc::clone(&self.store);
            let log_id = log_id.clone();
            let update = update.clone();
            async move { store.update_request_log_response(&log_id, &update).await }
        })
        .await?;

        let succeeded = response.as_ref().map(|r| r.status == 200).unwrap_or(false);
        if succeeded && !had_prior_success && !detection.challenge_detected {
            let event = LearningEvent::new(
                &target.id,
                EventType::Milestone,
                "First successful request",
                format!("200 from {url} with the current profile"),
            )
            .with_trust_impact(10)
            .with_dna_version(dna_snapshot_id);
            self.append_event(event).await?;
        }

        Ok(Observed {
            response,
            detection,
            url,
        })
    }

    /// Conservative local response to a challenge: record the event and
    /// widen the delay window by (+500, +1000) ms in a new snapshot.
    async fn adapt_pacing_after_challenge(
        &mut self,
        target: &Target,
        dna: &BehavioralDna,
        detection: &Detection,
    ) -> EngineResult<(BehavioralDna, String, String)> {
        let challenge_type = detection
            .challenge_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        let event = LearningEvent {
            challenge_type: Some(challenge_type.clone()),
            challenge_solved: Some(false),
            ..LearningEvent::new(
                &target.id,
                EventType::Challenge,
                format!("Challenge observed ({challenge_type})"),
                detection
                    .block_reason
                    .clone()
                    .unwrap_or_else(|| "challenge interstitial".to_string()),
            )
        }
        .with_trust_impact(-5);
        self.append_event(event).await?;

        let widened = serde_json::json!({
            "delay_range": {
                "min_ms": dna.timing.delay_range.min_ms + 500,
                "max_ms": dna.timing.delay_range.max_ms + 1_000,
            }
        });
        let proposal = MutationProposal {
            gene: Gene::Timing,
            change: widened,
            reason: format!("Local pacing widening after {challenge_type} challenge"),
            confidence: 0.5,
            risk_level: RiskLevel::Medium,
        };
        let result = self.mutator.mutate(&target.id, &proposal).await?;
        let version = result.snapshot.version.clone();
        Ok((result.dna, result.snapshot.id.clone(), version))
    }

    /// Consult the advisor about the blocked position and apply any
    /// mutations it proposes. Advisor failures are non-fatal; mutations
    /// from the offline mock are not applied (local adaptation already
    /// widened the pacing).
    async fn consult_advisor(
        &mut self,
        target: &Target,
        dna: &BehavioralDna,
        dna_version: &str,
        recent: &[RequestLog],
        last: &Observed,
    ) {
        let mut context = AdvisorContext::new(target, dna.clone(), dna_version.to_string());

        // Observations oldest-first, as the advisor reads them
        context.observations = recent
            .iter()
            .rev()
            .map(|log| {
                let kind = if log.challenge_detected {
                    ObservationKind::Challenge
                } else if log.was_blocked || log.response_status.is_none() {
                    ObservationKind::Blocked
                } else {
                    ObservationKind::Success
                };
                Observation {
                    kind,
                    summary: format!(
                        "{} {} -> {}",
                        log.method,
                        log.url,
                        log.response_status
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "no response".to_string()),
                    ),
                    timestamp: log.created_at,
                }
            })
            .collect();

        context.recent_events = match self.store.recent_learning_events(&target.id, 10).await {
            Ok(events) => events
                .iter()
                .map(|e| EventSummary {
                    event_type: e.event_type.as_str().to_string(),
                    outcome: e.title.clone(),
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        if last.detection.challenge_detected {
            context.current_challenge = Some(ChallengeContext {
                challenge_type: last
                    .detection
                    .challenge_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                difficulty: "unknown".to_string(),
                attempts: recent.iter().filter(|l| l.challenge_detected).count() as u32,
            });
        }

        context.last_request = last.response.as_ref().map(|r| RequestQuickView {
            url: last.url.clone(),
            status: Some(r.status as i32),
            was_blocked: last.detection.was_blocked,
            timing_ms: Some(r.timing_ms),
        });

        let response = match self.advisor.analyze(&context).await {
            Ok(response) => response,
            Err(err) => {
                // Non-fatal: skip the consultation, the widened delay range
                // already throttles the loop
                warn!(session_id = %self.id, error = %err, "Advisor consultation failed");
                return;
            }
        };

        if let Some(ref strategy) = response.strategy {
            debug!(
                session_id = %self.id,
                action = ?strategy.action,
                mock = response.mock,
                "Advisor strategy"
            );
        }

        if response.mock {
            return;
        }

        for proposal in &response.mutations {
            match self.mutator.mutate(&target.id, proposal).await {
                Ok(result) => {
                    info!(
                        session_id = %self.id,
                        gene = proposal.gene.as_str(),
                        version = %result.snapshot.version,
                        "Applied advisor mutation"
                    );
                }
                Err(err) => {
                    warn!(session_id = %self.id, error = %err, "Advisor mutation rejected");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn get_target(&self) -> EngineResult<Target> {
        self.store.get_target(&self.request.target_id).await
    }

    async fn active_dna(&self) -> EngineResult<Option<(BehavioralDna, String, String)>> {
        let Some(snapshot) = self.store.get_active_dna(&self.request.target_id).await? else {
            return Ok(None);
        };
        let dna = BehavioralDna::from_json(&snapshot.dna_json)?;
        Ok(Some((dna, snapshot.id, snapshot.version)))
    }

    async fn append_event(&mut self, event: LearningEvent) -> EngineResult<()> {
        self.with_retry("append_learning_event", || {
            let store = Arc::clone(&self.store);
            let event = event.clone();
            async move { store.append_learning_event(&event).await }
        })
        .await
    }

    async fn with_retry<T, Fut>(
        &self,
        name: &str,
        op: impl FnMut() -> Fut,
    ) -> EngineResult<T>
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        run_retried(&self.retry, name, op).await
    }

    /// Track store failures; more than the budget inside the window turns
    /// the next failure fatal.
    fn record_store_failure(&mut self) -> EngineResult<()> {
        let now = Instant::now();
        self.store_failures.push_back(now);
        while let Some(front) = self.store_failures.front() {
            if now.duration_since(*front) > STORE_FAILURE_WINDOW {
                self.store_failures.pop_front();
            } else {
                break;
            }
        }
        if self.store_failures.len() > STORE_FAILURE_BUDGET {
            return Err(SessionError::StoreFailureBudgetExceeded {
                count: self.store_failures.len() as u32,
                window: STORE_FAILURE_WINDOW,
            }
            .into());
        }
        Ok(())
    }

    fn is_fatal(&self, err: &EngineError) -> bool {
        matches!(
            err,
            EngineError::Session(_) | EngineError::Dna(_) | EngineError::Configuration(_)
        )
    }

    /// Park while paused; report stop. Checked at the top of each iteration
    /// and at every delay wake-up.
    async fn control_gate(&mut self) -> Flow {
        loop {
            let command = *self.control.borrow();
            match command {
                SessionControl::Run => {
                    let mut status = self.status.write().await;
                    if *status == SessionStatus::Paused {
                        info!(session_id = %self.id, "Session resumed");
                    }
                    *status = SessionStatus::Running;
                    return Flow::Proceed;
                }
                SessionControl::Stop => return Flow::Stopped,
                SessionControl::Pause => {
                    {
                        let mut status = self.status.write().await;
                        if *status != SessionStatus::Paused {
                            info!(session_id = %self.id, "Session paused");
                        }
                        *status = SessionStatus::Paused;
                    }
                    if self.control.changed().await.is_err() {
                        return Flow::Stopped;
                    }
                }
            }
        }
    }

    async fn cancellable_sleep(&mut self, duration: Duration) -> Flow {
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.control.changed() => true,
        };
        if interrupted {
            self.control_gate().await
        } else {
            Flow::Proceed
        }
    }

    fn pick_delay(range: &DelayRange) -> Duration {
        let min = range.min_ms.min(range.max_ms);
        let max = range.max_ms.max(range.min_ms);
        let millis = if min == max {
            min
        } else {
            rand::rng().random_range(min..=max)
        };
        Duration::from_millis(millis)
    }

    /// Choose the exploratory sub-request: a random same-host link from the
    /// last page when one exists, otherwise the fixed path cycle.
    fn pick_exploration_url(
        &mut self,
        target: &Target,
        response: Option<&ShapedResponse>,
    ) -> String {
        let base = Url::parse(&self.request.seed_url)
            .or_else(|_| Url::parse(&target.url))
            .ok();

        if let (Some(base), Some(response)) = (base.as_ref(), response) {
            let links = extract_same_host_links(base, &response.body);
            if !links.is_empty() {
                let index = rand::rng().random_range(0..links.len());
                return links[index].clone();
            }
        }

        let path = EXPLORE_PATHS[self.path_cursor % EXPLORE_PATHS.len()];
        self.path_cursor += 1;
        match base {
            Some(base) => base
                .join(path)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| self.request.seed_url.clone()),
            None => self.request.seed_url.clone(),
        }
    }

    fn goal_achieved(goal: &str, observed: &Observed) -> bool {
        let goal_lower = goal.to_lowercase();
        let needle = GOAL_PATTERNS
            .iter()
            .find(|(label, _)| *label == goal_lower)
            .map(|(_, marker)| *marker)
            .unwrap_or(goal_lower.as_str());

        if observed.url.to_lowercase().contains(needle) {
            return true;
        }
        observed
            .response
            .as_ref()
            .map(|r| r.body.to_lowercase().contains(needle))
            .unwrap_or(false)
    }

    /// Settle a failed session: the target keeps its partial progress, a
    /// final learning event records the cause, and the status reflects how
    /// far it got. A session that never advanced past its first iteration
    /// leaves the target learning rather than branding it failed.
    async fn settle_failure(&mut self, err: &EngineError) {
        let patch = TargetPatch {
            status: Some(if self.iterations > 1 {
                TargetStatus::Failed
            } else {
                TargetStatus::Learning
            }),
            ..Default::default()
        };
        if let Err(e) = self
            .store
            .update_target_fields(&self.request.target_id, &patch)
            .await
        {
            warn!(session_id = %self.id, error = %e, "Failed to settle target status");
        }

        let event = LearningEvent::new(
            &self.request.target_id,
            EventType::Other,
            "Crawl session failed",
            format!("Session {} aborted: {err}", self.id),
        );
        if let Err(e) = self.store.append_learning_event(&event).await {
            warn!(session_id = %self.id, error = %e, "Failed to record session failure");
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Extract same-host links from an HTML body. Kept synchronous: the parsed
/// document is not Send and must not live across an await point.
fn extract_same_host_links(base: &Url, body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|candidate| candidate.host_str() == base.host_str())
        .filter(|candidate| candidate.scheme().starts_with("http"))
        .map(|candidate| candidate.to_string())
        .collect()
}
