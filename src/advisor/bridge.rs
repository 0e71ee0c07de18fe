// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! The advisor bridge: builds the context envelope into a model request,
//! validates the returned tool calls, and degrades gracefully when no
//! advisor is configured or reachable.
//!
//! The offline fallback is shape-identical to a live response; callers
//! branch only on the `mock` flag, never on missing fields.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{model_is_supported, AdvisorConfig};
use crate::dna::Gene;
use crate::errors::{AdvisorError, EngineResult};
use crate::mutator::{MutationProposal, RiskLevel};

use super::context::AdvisorContext;
use super::provider::{ClaudeProvider, ContentBlock, LlmProvider, Message, Role};
use super::tools::{
    advisor_tool_definitions, parse_tool_call, StrategyAction, StrategyDecision, ToolInvocation,
    TrustEvaluation,
};

const SYSTEM_PROMPT: &str = "\
You are the adaptation advisor for a web reconnaissance engine. Each consultation gives you \
one target's behavioral profile (its DNA), recent request observations, and its trust \
position. Your job is to keep the profile credible: propose conservative DNA mutations when \
the target pushes back, assess trust honestly, and pick a strategy for the next phase. \
Prefer low-risk timing and network adjustments over identity changes; an identity change \
resets everything the profile has earned. Respond through the provided tools.";

/// Structured advisor output. `mock` marks the deterministic offline
/// fallback; its shape is identical to a live response.
#[derive(Debug, Clone)]
pub struct AdvisorResponse {
    pub mutations: Vec<MutationProposal>,
    pub trust_evaluation: Option<TrustEvaluation>,
    pub strategy: Option<StrategyDecision>,
    pub insight: Option<String>,
    pub mock: bool,
    pub model: String,
}

/// Bridge to the external advisor model.
pub struct AdvisorBridge {
    provider: Option<Arc<dyn LlmProvider>>,
    cache: Cache<String, AdvisorResponse>,
    config: AdvisorConfig,
}

impl std::fmt::Debug for AdvisorBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorBridge")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AdvisorBridge {
    /// Build the bridge. Without an API key the bridge stays offline and
    /// serves deterministic fallback responses; with one, the model name
    /// must pass the capability gate.
    pub fn new(config: AdvisorConfig) -> EngineResult<Self> {
        let provider: Option<Arc<dyn LlmProvider>> = match config.api_key {
            Some(ref api_key) => {
                if !model_is_supported(&config.model) {
                    return Err(AdvisorError::ModelUnsupported {
                        model: config.model.clone(),
                    }
                    .into());
                }
                Some(Arc::new(
                    ClaudeProvider::new(
                        api_key.clone(),
                        config.model.clone(),
                        config.max_tokens,
                        config.temperature,
                        Duration::from_secs(config.timeout_secs),
                    )
                    .map_err(|e| AdvisorError::Unavailable {
                        reason: e.to_string(),
                    })?,
                ))
            }
            None => None,
        };

        let cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Ok(Self {
            provider,
            cache,
            config,
        })
    }

    /// Build the bridge around an already-constructed provider, bypassing
    /// credential lookup. The model capability gate still applies. Used by
    /// embedders and tests that manage their own backend.
    pub fn with_provider(
        provider: Arc<dyn LlmProvider>,
        config: AdvisorConfig,
    ) -> EngineResult<Self> {
        if !model_is_supported(provider.model()) {
            return Err(AdvisorError::ModelUnsupported {
                model: provider.model().to_string(),
            }
            .into());
        }

        let cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Ok(Self {
            provider: Some(provider),
            cache,
            config,
        })
    }

    /// Whether a live advisor is configured.
    pub fn is_live(&self) -> bool {
        self.provider.is_some()
    }

    /// Consult the advisor about a target's situation.
    ///
    /// Live path: render the context, call the model under the configured
    /// deadline, and validate each returned tool call — an invalid call is
    /// discarded alone. Offline path: synthesize the deterministic mock.
    pub async fn analyze(&self, context: &AdvisorContext) -> EngineResult<AdvisorResponse> {
        let key = context.digest();
        if let Some(cached) = self.cache.get(&key).await {
            debug!(target = %context.target.url, "Advisor cache hit");
            return Ok(cached);
        }

        let response = match self.provider {
            Some(ref provider) => self.analyze_live(provider.as_ref(), context).await?,
            None => Self::mock_response(context, &self.config.model),
        };

        self.cache.insert(key, response.clone()).await;
        Ok(response)
    }

    async fn analyze_live(
        &self,
        provider: &dyn LlmProvider,
        context: &AdvisorContext,
    ) -> EngineResult<AdvisorResponse> {
        let messages = vec![Message {
            role: Role::User,
            content: vec![ContentBlock::Text {
                text: context.render_prompt(),
            }],
        }];
        let tools = advisor_tool_definitions();

        let deadline = Duration::from_secs(self.config.timeout_secs);
        let llm_response =
            tokio::time::timeout(deadline, provider.chat(SYSTEM_PROMPT, &messages, &tools))
                .await
                .map_err(|_| AdvisorError::Unavailable {
                    reason: format!("advisor call exceeded {deadline:?}"),
                })?
                .map_err(|e| AdvisorError::Unavailable {
                    reason: e.to_string(),
                })?;

        let mut mutations = Vec::new();
        let mut trust_evaluation: Option<TrustEvaluation> = None;
        let mut strategy: Option<StrategyDecision> = None;

        for (name, input) in llm_response.tool_calls() {
            match parse_tool_call(name, input) {
                Ok(ToolInvocation::Mutation(m)) => mutations.push(m),
                Ok(ToolInvocation::TrustEvaluation(e)) => {
                    if trust_evaluation.replace(e).is_some() {
                        warn!("Advisor returned more than one trust evaluation, keeping the last");
                    }
                }
                Ok(ToolInvocation::Strategy(s)) => {
                    if strategy.replace(s).is_some() {
                        warn!("Advisor returned more than one strategy, keeping the last");
                    }
                }
                // A single malformed call is discarded; the rest survive
                Err(e) => warn!(error = %e, "Discarding invalid advisor tool call"),
            }
        }

        let text = llm_response.text();
        let insight = if text.is_empty() { None } else { Some(text) };

        Ok(AdvisorResponse {
            mutations,
            trust_evaluation,
            strategy,
            insight,
            mock: false,
            model: provider.model().to_string(),
        })
    }

    /// Deterministic offline response: one low-risk timing mutation that
    /// widens the delay window by 1-2 s, a trust evaluation nudging the
    /// current score up by 5 (clamped to 100), and a `continue` strategy.
    fn mock_response(context: &AdvisorContext, model: &str) -> AdvisorResponse {
        let current = context.dna.timing.delay_range;
        let widened = serde_json::json!({
            "delay_range": {
                "min_ms": current.min_ms + 1_000,
                "max_ms": current.max_ms + 2_000,
            }
        });

        let mutation = MutationProposal {
            gene: Gene::Timing,
            change: widened,
            reason: "Widen request pacing to reduce detection pressure".to_string(),
            confidence: 0.6,
            risk_level: RiskLevel::Low,
        };

        let trust_evaluation = TrustEvaluation {
            trust_score: (context.target.trust_score + 5).min(100),
            signals: vec!["offline heuristic".to_string()],
            recommendation: "continue with widened pacing".to_string(),
            should_continue: true,
        };

        let strategy = StrategyDecision {
            action: StrategyAction::Continue,
            reason: "no advisor configured, conservative default".to_string(),
            parameters: None,
        };

        AdvisorResponse {
            mutations: vec![mutation],
            trust_evaluation: Some(trust_evaluation),
            strategy: Some(strategy),
            insight: None,
            mock: true,
            model: format!("mock:{model}"),
        }
    }
}
