// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! LLM advisor bridge.
//!
//! Structured-tool consultation of an external model that proposes DNA
//! mutations and strategy actions, with a deterministic offline fallback
//! when no credentials are configured.

pub mod bridge;
pub mod context;
pub mod provider;
pub mod tools;

pub use bridge::{AdvisorBridge, AdvisorResponse};
pub use context::{
    AdvisorContext, ChallengeContext, EventSummary, Observation, ObservationKind,
    RequestQuickView, TargetSummary,
};
pub use provider::{ClaudeProvider, ContentBlock, LlmProvider, LlmResponse, Message, Role};
pub use tools::{
    advisor_tool_definitions, StrategyAction, StrategyDecision, ToolDefinition, TrustEvaluation,
};
