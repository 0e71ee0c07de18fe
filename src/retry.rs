// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Store Write Retry Policy
 * Bounded re-attempts with growing, jittered pauses for transient
 * persistence failures inside the crawl loop
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::EngineResult;

/// How many tries a store write gets and how long to pause between them.
/// The pause doubles per failure up to `ceiling`, with a proportional
/// random spread so concurrent sessions do not re-attempt in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, the first included
    pub attempts: u32,

    /// Pause after the first failure
    pub base_delay: Duration,

    /// Upper bound on any single pause
    pub ceiling: Duration,

    /// Per-failure delay multiplier
    pub growth: f64,

    /// Random spread as a fraction of the computed pause; 0.0 disables
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            base_delay: Duration::from_millis(200),
            ceiling: Duration::from_secs(5),
            growth: 2.0,
            jitter: 0.3,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Pause before the next try, given how many tries have failed.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let scaled = self.base_delay.as_millis() as f64 * self.growth.powi(failures as i32 - 1);
        let mut millis = scaled.min(self.ceiling.as_millis() as f64);

        if self.jitter > 0.0 && millis > 0.0 {
            let spread = millis * self.jitter;
            millis = (millis + rand::rng().random_range(-spread..spread)).max(0.0);
        }

        Duration::from_millis(millis as u64)
    }
}

/// Drive `op` until it succeeds, the error is not worth re-attempting, or
/// the policy's tries run out. The last error is handed back unwrapped so
/// the session can count it against its failure budget.
pub async fn run_retried<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut failures = 0u32;

    loop {
        let err = match op().await {
            Ok(value) => {
                if failures > 0 {
                    debug!(label, failures, "Write landed after re-attempt");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(label, error = %err, "Error is permanent, handing back");
            return Err(err);
        }

        failures += 1;
        if failures >= policy.attempts {
            warn!(label, failures, error = %err, "Out of tries");
            return Err(err);
        }

        let pause = policy.delay_for(failures);
        debug!(
            label,
            failures,
            pause_ms = pause.as_millis() as u64,
            error = %err,
            "Transient failure, pausing before the next try"
        );
        tokio::time::sleep(pause).await;
    }
}
