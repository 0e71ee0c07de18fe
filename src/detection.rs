// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Challenge & Block Detection
 * Heuristics for classifying WAF interstitials, CAPTCHAs and rate limits
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

/// Case-insensitive body markers that flag a challenge interstitial.
const CHALLENGE_MARKERS: &[&str] = &["challenge", "captcha", "shield", "bot detected"];

/// Known challenge vendors, matched by substring against the lowercased
/// body. First hit wins; anything else classifies as "unknown".
const CHALLENGE_VENDORS: &[&str] = &["altcha", "recaptcha", "hcaptcha", "cf-turnstile"];

/// Outcome of inspecting one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub was_blocked: bool,
    pub block_reason: Option<String>,
    pub challenge_detected: bool,
    pub challenge_type: Option<String>,
}

impl Detection {
    pub fn clean() -> Self {
        Self::default()
    }
}

/// Inspect a completed response for challenge and block signals.
///
/// A challenge is flagged when:
/// - status is 403 or 429, or
/// - the body (case-insensitive) contains a challenge marker, or
/// - the content type is JavaScript and the body contains an `eval`
pub fn inspect_response(status: u16, content_type: Option<&str>, body: &str) -> Detection {
    let body_lower = body.to_lowercase();

    let status_challenge = status == 403 || status == 429;
    let marker_challenge = CHALLENGE_MARKERS.iter().any(|m| body_lower.contains(m));
    let js_challenge = content_type
        .map(|ct| ct.contains("javascript") && body_lower.contains("eval"))
        .unwrap_or(false);

    if !(status_challenge || marker_challenge || js_challenge) {
        return Detection::clean();
    }

    let challenge_type = classify_challenge(&body_lower);
    let block_reason = if status == 429 {
        Some("rate_limit".to_string())
    } else if status == 403 {
        Some("forbidden".to_string())
    } else if js_challenge {
        Some("js_challenge".to_string())
    } else {
        Some("challenge_page".to_string())
    };

    Detection {
        was_blocked: true,
        block_reason,
        challenge_detected: true,
        challenge_type: Some(challenge_type),
    }
}

/// Classify the challenge vendor by substring match on the lowercased body.
fn classify_challenge(body_lower: &str) -> String {
    for vendor in CHALLENGE_VENDORS {
        if body_lower.contains(vendor) {
            return (*vendor).to_string();
        }
    }
    "unknown".to_string()
}
