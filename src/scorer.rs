// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Green-Light Calculator
 * Weighted multi-signal trust scoring with hysteresis state transitions
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dna::BehavioralDna;
use crate::types::{
    GreenLightState, GreenLightStatus, NavigationPolicy, RequestLog, Signal, SignalCheck, Target,
};

// Hysteresis thresholds. Promotion requires crossing the upper bound;
// demotion from ESTABLISHED triggers below 70 rather than 75.
const PROMOTE_YELLOW: i32 = 25;
const PROMOTE_GREEN: i32 = 50;
const PROMOTE_ESTABLISHED: i32 = 75;
const DEMOTE_ESTABLISHED: i32 = 70;

const WEIGHT_FINGERPRINT: f64 = 0.25;
const WEIGHT_BEHAVIOR: f64 = 0.25;
const WEIGHT_CHALLENGE: f64 = 0.20;
const WEIGHT_SESSION: f64 = 0.15;
const WEIGHT_NETWORK: f64 = 0.15;

/// Average inter-request interval below this is considered robotic
const HUMAN_INTERVAL_MS: i64 = 500;
/// Any single interval below this is a burst
const BURST_INTERVAL_MS: i64 = 100;
/// Tolerated count of blocked challenges in the window
const MAX_REPEATED_FAILURES: usize = 2;
/// Average response time above this fails the latency check
const MAX_AVG_RESPONSE_MS: i64 = 10_000;

/// Pure green-light computation. Wall-clock enters only through `now`;
/// identical inputs always produce identical outputs.
pub struct Scorer;

impl Scorer {
    /// Compute the five weighted signals, the aggregate trust score and the
    /// (at most one level) state transition for this tick.
    pub fn calculate(
        target: &Target,
        dna: &BehavioralDna,
        recent: &[RequestLog],
        now: DateTime<Utc>,
    ) -> GreenLightState {
        let signals = Self::compute_signals(dna, recent);
        let trust_score = Self::aggregate(&signals);

        let previous_status = target.green_light_status;
        let previous_score = target.trust_score;
        let status = Self::transition(previous_status, trust_score);

        let entering = status == GreenLightStatus::Established
            && previous_status != GreenLightStatus::Established;
        let leaving = previous_status == GreenLightStatus::Established
            && status != GreenLightStatus::Established;
        let holding = status == GreenLightStatus::Established
            && previous_status == GreenLightStatus::Established;

        let established_at = if entering {
            Some(now)
        } else if status == GreenLightStatus::Established {
            target.established_at
        } else {
            None
        };

        // One tick of maintenance per calculation while ESTABLISHED holds;
        // any transition in or out restarts the counter.
        let maintained_for = if holding { target.maintained_for + 1 } else { 0 };

        let (lost_at, reason_lost) = if leaving {
            (
                Some(now),
                Some(format!(
                    "trust score dropped to {trust_score} (threshold {DEMOTE_ESTABLISHED})"
                )),
            )
        } else {
            (None, None)
        };

        let decay_rate = ((previous_score - trust_score).max(0) as f64) * 0.1;

        if status != previous_status {
            debug!(
                target_id = %target.id,
                from = %previous_status,
                to = %status,
                trust_score = trust_score,
                "Green-light transition"
            );
        }

        GreenLightState {
            target_id: target.id.clone(),
            status,
            trust_score,
            signals,
            decay_rate,
            established_at,
            maintained_for,
            lost_at,
            reason_lost,
            calculated_at: now,
        }
    }

    /// Apply the hysteresis table. Moves at most one level per call in
    /// either direction; a collapse from ESTABLISHED to RED takes three
    /// consecutive bad ticks, not one.
    pub fn transition(current: GreenLightStatus, score: i32) -> GreenLightStatus {
        match current {
            GreenLightStatus::Red => {
                if score >= PROMOTE_YELLOW {
                    GreenLightStatus::Yellow
                } else {
                    GreenLightStatus::Red
                }
            }
            GreenLightStatus::Yellow => {
                if score >= PROMOTE_GREEN {
                    GreenLightStatus::Green
                } else if score < PROMOTE_YELLOW {
                    GreenLightStatus::Red
                } else {
                    GreenLightStatus::Yellow
                }
            }
            GreenLightStatus::Green => {
                if score >= PROMOTE_ESTABLISHED {
                    GreenLightStatus::Established
                } else if score < PROMOTE_GREEN {
                    GreenLightStatus::Yellow
                } else {
                    GreenLightStatus::Green
                }
            }
            GreenLightStatus::Established => {
                if score < DEMOTE_ESTABLISHED {
                    GreenLightStatus::Green
                } else {
                    GreenLightStatus::Established
                }
            }
        }
    }

    /// Capability record for a given green-light tier.
    pub fn navigation_policy(status: GreenLightStatus) -> NavigationPolicy {
        match status {
            GreenLightStatus::Red => NavigationPolicy {
                can_navigate: false,
                max_requests_per_sec: 0.0,
                allow_forms: false,
                description: "no navigation, analyze only",
            },
            GreenLightStatus::Yellow => NavigationPolicy {
                can_navigate: true,
                max_requests_per_sec: 1.0 / 3.0,
                allow_forms: false,
                description: "read-only, at most one request per 3s",
            },
            GreenLightStatus::Green => NavigationPolicy {
                can_navigate: true,
                max_requests_per_sec: 3.0,
                allow_forms: true,
                description: "simple forms allowed, up to 3 rps",
            },
            GreenLightStatus::Established => NavigationPolicy {
                can_navigate: true,
                max_requests_per_sec: f64::INFINITY,
                allow_forms: true,
                description: "unrestricted",
            },
        }
    }

    fn compute_signals(dna: &BehavioralDna, recent: &[RequestLog]) -> Vec<Signal> {
        // Logs arrive newest-first from the store; intervals want ascending
        let mut ordered: Vec<&RequestLog> = recent.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        vec![
            Self::fingerprint_signal(dna, &ordered),
            Self::behavior_signal(&ordered),
            Self::challenge_signal(&ordered),
            Self::session_signal(&ordered),
            Self::network_signal(&ordered),
        ]
    }

    fn fingerprint_signal(dna: &BehavioralDna, logs: &[&RequestLog]) -> Signal {
        let tls_consistent = !logs.iter().any(|l| {
            l.was_blocked
                && l.block_reason
                    .as_deref()
                    .map(|r| r.contains("fingerprint"))
                    .unwrap_or(false)
        });

        let header_order_preserved = dna
            .network
            .headers
            .iter()
            .all(|(name, _)| dna.network.header_order.iter().any(|o| o == name));

        let ja3_valid = dna
            .network
            .ja3_hash
            .as_deref()
            .map(|h| !h.is_empty())
            .unwrap_or(false);

        let http2_supported = dna.network.http_version.starts_with('2');

        Self::signal(
            "fingerprint",
            WEIGHT_FINGERPRINT,
            vec![
                ("tls_consistent", tls_consistent),
                ("header_order_preserved", header_order_preserved),
                ("ja3_valid", ja3_valid),
                ("http2_supported", http2_supported),
            ],
        )
    }

    fn behavior_signal(logs: &[&RequestLog]) -> Signal {
        let intervals: Vec<i64> = logs
            .windows(2)
            .map(|pair| {
                (pair[1].created_at - pair[0].created_at)
                    .num_milliseconds()
                    .max(0)
            })
            .collect();

        // With fewer than two requests there is nothing to measure; the
        // pacing checks pass by vacuity
        let timing_human_like = if intervals.is_empty() {
            true
        } else {
            let avg = intervals.iter().sum::<i64>() / intervals.len() as i64;
            avg >= HUMAN_INTERVAL_MS
        };

        let no_bursts = intervals
            .iter()
            .all(|&interval| interval >= BURST_INTERVAL_MS);

        Self::signal(
            "behavior",
            WEIGHT_BEHAVIOR,
            vec![
                ("timing_human_like", timing_human_like),
                ("no_bursts", no_bursts),
                ("mouse_pattern_natural", true),
                ("scroll_pattern_natural", true),
            ],
        )
    }

    fn challenge_signal(logs: &[&RequestLog]) -> Signal {
        let no_unsolved_challenges = !logs.iter().any(|l| l.challenge_detected);

        let repeated_failures = logs
            .iter()
            .filter(|l| l.was_blocked && l.challenge_detected)
            .count();

        Self::signal(
            "challenge",
            WEIGHT_CHALLENGE,
            vec![
                ("no_unsolved_challenges", no_unsolved_challenges),
                (
                    "failures_within_tolerance",
                    repeated_failures <= MAX_REPEATED_FAILURES,
                ),
                ("solution_time_acceptable", true),
            ],
        )
    }

    fn session_signal(logs: &[&RequestLog]) -> Signal {
        let successes: Vec<&&RequestLog> = logs
            .iter()
            .filter(|l| l.response_status == Some(200))
            .collect();

        let cookies_accepted = !successes.is_empty();

        // Session duration is derivable from the first and last success
        let session_stable = match (successes.first(), successes.last()) {
            (Some(first), Some(last)) => {
                (last.created_at - first.created_at).num_milliseconds() >= 0
            }
            _ => false,
        };

        let no_token_refresh_loop = !logs.iter().any(|l| l.response_status == Some(401));

        Self::signal(
            "session",
            WEIGHT_SESSION,
            vec![
                ("cookies_accepted", cookies_accepted),
                ("session_stable", session_stable),
                ("no_token_refresh_loop", no_token_refresh_loop),
            ],
        )
    }

    fn network_signal(logs: &[&RequestLog]) -> Signal {
        let no_rate_limiting = !logs.iter().any(|l| l.response_status == Some(429));

        let ip_reputation_clean = !logs.iter().any(|l| {
            l.block_reason
                .as_deref()
                .map(|r| r.contains("ip_blacklist"))
                .unwrap_or(false)
        });

        let timings: Vec<i64> = logs.iter().filter_map(|l| l.timing_ms).collect();
        let latency_acceptable = if timings.is_empty() {
            true
        } else {
            timings.iter().sum::<i64>() / timings.len() as i64 <= MAX_AVG_RESPONSE_MS
        };

        Self::signal(
            "network",
            WEIGHT_NETWORK,
            vec![
                ("no_rate_limiting", no_rate_limiting),
                ("ip_reputation_clean", ip_reputation_clean),
                ("latency_acceptable", latency_acceptable),
            ],
        )
    }

    fn signal(name: &str, weight: f64, checks: Vec<(&str, bool)>) -> Signal {
        let passed = checks.iter().filter(|(_, ok)| *ok).count();
        let score = passed as f64 / checks.len() as f64 * 100.0;
        Signal {
            name: name.to_string(),
            score,
            weight,
            checks: checks
                .into_iter()
                .map(|(name, passed)| SignalCheck {
                    name: name.to_string(),
                    passed,
                })
                .collect(),
        }
    }

    fn aggregate(signals: &[Signal]) -> i32 {
        let weighted: f64 = signals.iter().map(|s| s.score * s.weight).sum();
        (weighted.round() as i32).clamp(0, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn log_at(target_id: &str, offset_ms: i64, status: i32) -> RequestLog {
        let mut log = RequestLog::new(target_id, None, "GET", "https://example.com/", json!({}));
        log.created_at = Utc::now() + Duration::milliseconds(offset_ms);
        log.response_status = Some(status);
        log.timing_ms = Some(150);
        log
    }

    fn challenge_log(target_id: &str, offset_ms: i64) -> RequestLog {
        let mut log = log_at(target_id, offset_ms, 403);
        log.was_blocked = true;
        log.challenge_detected = true;
        log.challenge_type = Some("unknown".to_string());
        log.block_reason = Some("forbidden".to_string());
        log
    }

    fn target_with(status: GreenLightStatus, score: i32) -> Target {
        let mut target = Target::new("https://example.com");
        target.green_light_status = status;
        target.trust_score = score;
        target
    }

    // ------------------------------------------------------------------
    // Transition table boundaries
    // ------------------------------------------------------------------

    #[test]
    fn test_exact_thresholds_promote() {
        assert_eq!(
            Scorer::transition(GreenLightStatus::Red, 25),
            GreenLightStatus::Yellow
        );
        assert_eq!(
            Scorer::transition(GreenLightStatus::Yellow, 50),
            GreenLightStatus::Green
        );
        assert_eq!(
            Scorer::transition(GreenLightStatus::Green, 75),
            GreenLightStatus::Established
        );
    }

    #[test]
    fn test_below_thresholds_hold_or_demote() {
        assert_eq!(
            Scorer::transition(GreenLightStatus::Red, 24),
            GreenLightStatus::Red
        );
        assert_eq!(
            Scorer::transition(GreenLightStatus::Yellow, 24),
            GreenLightStatus::Red
        );
        assert_eq!(
            Scorer::transition(GreenLightStatus::Green, 49),
            GreenLightStatus::Yellow
        );
        assert_eq!(
            Scorer::transition(GreenLightStatus::Established, 69),
            GreenLightStatus::Green
        );
    }

    #[test]
    fn test_established_hysteresis_band() {
        // 70..75 holds ESTABLISHED even though promotion needed 75
        assert_eq!(
            Scorer::transition(GreenLightStatus::Established, 70),
            GreenLightStatus::Established
        );
        assert_eq!(
            Scorer::transition(GreenLightStatus::Established, 74),
            GreenLightStatus::Established
        );
    }

    #[test]
    fn test_never_skips_levels() {
        // A perfect score from RED still only reaches YELLOW
        assert_eq!(
            Scorer::transition(GreenLightStatus::Red, 100),
            GreenLightStatus::Yellow
        );
        // A zero score from ESTABLISHED only falls to GREEN
        assert_eq!(
            Scorer::transition(GreenLightStatus::Established, 0),
            GreenLightStatus::Green
        );
        // And from GREEN only to YELLOW
        assert_eq!(
            Scorer::transition(GreenLightStatus::Green, 0),
            GreenLightStatus::Yellow
        );
    }

    // ------------------------------------------------------------------
    // Full calculation
    // ------------------------------------------------------------------

    #[test]
    fn test_perfect_window_scores_100() {
        let target = target_with(GreenLightStatus::Red, 0);
        let dna = BehavioralDna::default_profile();
        let logs = vec![
            log_at(&target.id, 0, 200),
            log_at(&target.id, 1_000, 200),
            log_at(&target.id, 2_100, 200),
        ];

        let state = Scorer::calculate(&target, &dna, &logs, Utc::now());
        assert_eq!(state.trust_score, 100);
        assert_eq!(state.status, GreenLightStatus::Yellow);
    }

    #[test]
    fn test_scorer_is_pure() {
        let target = target_with(GreenLightStatus::Yellow, 40);
        let dna = BehavioralDna::default_profile();
        let logs = vec![log_at(&target.id, 0, 200), challenge_log(&target.id, 900)];
        let now = Utc::now();

        let a = Scorer::calculate(&target, &dna, &logs, now);
        let b = Scorer::calculate(&target, &dna, &logs, now);
        assert_eq!(a.trust_score, b.trust_score);
        assert_eq!(a.status, b.status);
        assert_eq!(a.maintained_for, b.maintained_for);
    }

    #[test]
    fn test_empty_window_is_well_defined() {
        let target = target_with(GreenLightStatus::Red, 0);
        let dna = BehavioralDna::default_profile();

        let state = Scorer::calculate(&target, &dna, &[], Utc::now());

        // Behavior checks pass by vacuity; session reports no cookies
        let behavior = state.signals.iter().find(|s| s.name == "behavior").unwrap();
        assert_eq!(behavior.score, 100.0);
        let session = state.signals.iter().find(|s| s.name == "session").unwrap();
        let cookies = session
            .checks
            .iter()
            .find(|c| c.name == "cookies_accepted")
            .unwrap();
        assert!(!cookies.passed);
    }

    #[test]
    fn test_entering_established_stamps_and_zeroes() {
        let mut target = target_with(GreenLightStatus::Green, 74);
        target.maintained_for = 7;
        let dna = BehavioralDna::default_profile();
        let logs = vec![log_at(&target.id, 0, 200), log_at(&target.id, 1_000, 200)];
        let now = Utc::now();

        let state = Scorer::calculate(&target, &dna, &logs, now);
        assert_eq!(state.status, GreenLightStatus::Established);
        assert_eq!(state.established_at, Some(now));
        assert_eq!(state.maintained_for, 0);
    }

    #[test]
    fn test_holding_established_accumulates_ticks() {
        let mut target = target_with(GreenLightStatus::Established, 90);
        target.maintained_for = 120;
        target.established_at = Some(Utc::now() - Duration::seconds(120));
        let dna = BehavioralDna::default_profile();
        let logs = vec![log_at(&target.id, 0, 200), log_at(&target.id, 1_000, 200)];

        let state = Scorer::calculate(&target, &dna, &logs, Utc::now());
        assert_eq!(state.status, GreenLightStatus::Established);
        assert_eq!(state.maintained_for, 121);
        assert_eq!(state.established_at, target.established_at);
    }

    #[test]
    fn test_demotion_resets_maintained_for() {
        let mut target = target_with(GreenLightStatus::Established, 76);
        target.maintained_for = 120;
        target.established_at = Some(Utc::now() - Duration::seconds(120));
        let dna = BehavioralDna::default_profile();

        // A window full of challenges drives the score far below 70
        let logs = vec![
            challenge_log(&target.id, 0),
            challenge_log(&target.id, 1_000),
            challenge_log(&target.id, 2_000),
        ];

        let state = Scorer::calculate(&target, &dna, &logs, Utc::now());
        assert_eq!(state.status, GreenLightStatus::Green);
        assert_eq!(state.maintained_for, 0);
        assert!(state.lost_at.is_some());
        assert!(state.reason_lost.is_some());
        assert!(state.decay_rate > 0.0);
    }

    #[test]
    fn test_decay_rate_telemetry() {
        let target = target_with(GreenLightStatus::Yellow, 80);
        let dna = BehavioralDna::default_profile();
        let logs = vec![
            challenge_log(&target.id, 0),
            challenge_log(&target.id, 1_000),
            challenge_log(&target.id, 2_000),
        ];

        let state = Scorer::calculate(&target, &dna, &logs, Utc::now());
        let expected = ((80 - state.trust_score).max(0) as f64) * 0.1;
        assert!((state.decay_rate - expected).abs() < f64::EPSILON);

        // Rising scores report zero decay
        let target = target_with(GreenLightStatus::Red, 0);
        let logs = vec![log_at(&target.id, 0, 200)];
        let state = Scorer::calculate(&target, &dna, &logs, Utc::now());
        assert_eq!(state.decay_rate, 0.0);
    }

    // ------------------------------------------------------------------
    // Navigation policy
    // ------------------------------------------------------------------

    #[test]
    fn test_navigation_policy_table() {
        let red = Scorer::navigation_policy(GreenLightStatus::Red);
        assert!(!red.can_navigate);
        assert_eq!(red.max_requests_per_sec, 0.0);

        let yellow = Scorer::navigation_policy(GreenLightStatus::Yellow);
        assert!(yellow.can_navigate);
        assert!(!yellow.allow_forms);
        assert!((yellow.max_requests_per_sec - 1.0 / 3.0).abs() < f64::EPSILON);

        let green = Scorer::navigation_policy(GreenLightStatus::Green);
        assert!(green.allow_forms);
        assert_eq!(green.max_requests_per_sec, 3.0);

        let established = Scorer::navigation_policy(GreenLightStatus::Established);
        assert!(established.max_requests_per_sec.is_infinite());
    }

    // ------------------------------------------------------------------
    // Individual signals
    // ------------------------------------------------------------------

    #[test]
    fn test_burst_detection() {
        let target = target_with(GreenLightStatus::Red, 0);
        let dna = BehavioralDna::default_profile();
        // 50ms apart: a burst, and the average is also below 500ms
        let logs = vec![log_at(&target.id, 0, 200), log_at(&target.id, 50, 200)];

        let state = Scorer::calculate(&target, &dna, &logs, Utc::now());
        let behavior = state.signals.iter().find(|s| s.name == "behavior").unwrap();
        let no_bursts = behavior.checks.iter().find(|c| c.name == "no_bursts").unwrap();
        let human = behavior
            .checks
            .iter()
            .find(|c| c.name == "timing_human_like")
            .unwrap();
        assert!(!no_bursts.passed);
        assert!(!human.passed);
    }

    #[test]
    fn test_rate_limit_fails_network_check() {
        let target = target_with(GreenLightStatus::Red, 0);
        let dna = BehavioralDna::default_profile();
        let logs = vec![log_at(&target.id, 0, 429)];

        let state = Scorer::calculate(&target, &dna, &logs, Utc::now());
        let network = state.signals.iter().find(|s| s.name == "network").unwrap();
        let check = network
            .checks
            .iter()
            .find(|c| c.name == "no_rate_limiting")
            .unwrap();
        assert!(!check.passed);
    }

    #[test]
    fn test_fingerprint_block_fails_tls_check() {
        let target = target_with(GreenLightStatus::Red, 0);
        let dna = BehavioralDna::default_profile();
        let mut log = log_at(&target.id, 0, 403);
        log.was_blocked = true;
        log.block_reason = Some("tls fingerprint mismatch".to_string());

        let state = Scorer::calculate(&target, &dna, &[log], Utc::now());
        let fp = state
            .signals
            .iter()
            .find(|s| s.name == "fingerprint")
            .unwrap();
        let tls = fp.checks.iter().find(|c| c.name == "tls_consistent").unwrap();
        assert!(!tls.passed);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let target = target_with(GreenLightStatus::Red, 0);
        let dna = BehavioralDna::default_profile();
        let state = Scorer::calculate(&target, &dna, &[], Utc::now());
        let total: f64 = state.signals.iter().map(|s| s.weight).sum();
        assert!((total - 1.0).abs() < f64::EPSILON);
    }
}
