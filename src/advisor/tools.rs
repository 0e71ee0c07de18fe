// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Tool definitions the advisor model may invoke, and the schema-validated
//! parsing of returned tool calls.
//!
//! The advisor protocol is three fixed tools: zero or more mutation
//! suggestions, at most one trust evaluation, at most one strategy
//! decision. A tool call that fails validation is discarded on its own;
//! the rest of the response survives.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dna::Gene;
use crate::errors::AdvisorError;
use crate::mutator::{MutationProposal, RiskLevel};

/// A tool definition the LLM can invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

pub const TOOL_SUGGEST_MUTATION: &str = "suggest_dna_mutation";
pub const TOOL_EVALUATE_TRUST: &str = "evaluate_trust_status";
pub const TOOL_DETERMINE_STRATEGY: &str = "determine_strategy";

/// The fixed advisor tool set.
pub fn advisor_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: TOOL_SUGGEST_MUTATION.into(),
            description: "Propose a mutation to one gene of the target's behavioral DNA. \
                Use when the current profile is being challenged or blocked. The change is a \
                shallow patch applied to the named gene only."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "gene": {
                        "type": "string",
                        "enum": ["identity", "timing", "network", "interaction", "capabilities"],
                        "description": "Which gene to mutate"
                    },
                    "change": {
                        "type": "object",
                        "description": "Shallow patch: field name to new value within the gene"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why this mutation should help"
                    },
                    "confidence": {
                        "type": "number",
                        "minimum": 0.0,
                        "maximum": 1.0
                    },
                    "riskLevel": {
                        "type": "string",
                        "enum": ["low", "medium", "high"],
                        "description": "How likely this change is to disturb an otherwise working profile"
                    }
                },
                "required": ["gene", "change", "reason", "confidence", "riskLevel"]
            }),
        },
        ToolDefinition {
            name: TOOL_EVALUATE_TRUST.into(),
            description: "Report your assessment of the current trust position against this \
                target: an overall score, the signals that informed it, and whether the crawl \
                should continue."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "trustScore": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": 100
                    },
                    "signals": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "recommendation": { "type": "string" },
                    "shouldContinue": { "type": "boolean" }
                },
                "required": ["trustScore", "signals", "recommendation", "shouldContinue"]
            }),
        },
        ToolDefinition {
            name: TOOL_DETERMINE_STRATEGY.into(),
            description: "Decide the crawl strategy for the next phase: continue as-is, pause, \
                adapt the profile, retreat from a hostile target, or accelerate against a \
                welcoming one."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["continue", "pause", "adapt", "retreat", "accelerate"]
                    },
                    "reason": { "type": "string" },
                    "parameters": {
                        "type": "object",
                        "description": "Optional action-specific parameters"
                    }
                },
                "required": ["action", "reason"]
            }),
        },
    ]
}

// ---------------------------------------------------------------------------
// Parsed tool invocations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyAction {
    Continue,
    Pause,
    Adapt,
    Retreat,
    Accelerate,
}

impl StrategyAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "continue" => Some(StrategyAction::Continue),
            "pause" => Some(StrategyAction::Pause),
            "adapt" => Some(StrategyAction::Adapt),
            "retreat" => Some(StrategyAction::Retreat),
            "accelerate" => Some(StrategyAction::Accelerate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEvaluation {
    pub trust_score: i32,
    pub signals: Vec<String>,
    pub recommendation: String,
    pub should_continue: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub action: StrategyAction,
    pub reason: String,
    pub parameters: Option<serde_json::Value>,
}

/// One validated tool call out of the advisor's response.
#[derive(Debug, Clone)]
pub enum ToolInvocation {
    Mutation(MutationProposal),
    TrustEvaluation(TrustEvaluation),
    Strategy(StrategyDecision),
}

/// Validate one returned tool call against its schema. Unknown tool names
/// and malformed inputs fail with a protocol error naming the tool.
pub fn parse_tool_call(
    name: &str,
    input: &serde_json::Value,
) -> Result<ToolInvocation, AdvisorError> {
    match name {
        TOOL_SUGGEST_MUTATION => parse_mutation(input).map(ToolInvocation::Mutation),
        TOOL_EVALUATE_TRUST => parse_trust_evaluation(input).map(ToolInvocation::TrustEvaluation),
        TOOL_DETERMINE_STRATEGY => parse_strategy(input).map(ToolInvocation::Strategy),
        other => Err(AdvisorError::Protocol {
            tool: other.to_string(),
            reason: "unknown tool".to_string(),
        }),
    }
}

fn protocol_err(tool: &str, reason: impl Into<String>) -> AdvisorError {
    AdvisorError::Protocol {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

fn parse_mutation(input: &serde_json::Value) -> Result<MutationProposal, AdvisorError> {
    let tool = TOOL_SUGGEST_MUTATION;

    let gene_str = input["gene"]
        .as_str()
        .ok_or_else(|| protocol_err(tool, "missing 'gene'"))?;
    let gene = Gene::parse(gene_str)
        .map_err(|_| protocol_err(tool, format!("unknown gene '{gene_str}'")))?;

    let change = input
        .get("change")
        .filter(|c| c.is_object())
        .cloned()
        .ok_or_else(|| protocol_err(tool, "'change' must be an object"))?;

    let reason = input["reason"]
        .as_str()
        .ok_or_else(|| protocol_err(tool, "missing 'reason'"))?
        .to_string();

    let confidence = input["confidence"]
        .as_f64()
        .ok_or_else(|| protocol_err(tool, "missing 'confidence'"))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(protocol_err(
            tool,
            format!("confidence {confidence} outside [0, 1]"),
        ));
    }

    let risk_str = input["riskLevel"]
        .as_str()
        .ok_or_else(|| protocol_err(tool, "missing 'riskLevel'"))?;
    let risk_level = RiskLevel::parse(risk_str)
        .ok_or_else(|| protocol_err(tool, format!("unknown riskLevel '{risk_str}'")))?;

    Ok(MutationProposal {
        gene,
        change,
        reason,
        confidence,
        risk_level,
    })
}

fn parse_trust_evaluation(input: &serde_json::Value) -> Result<TrustEvaluation, AdvisorError> {
    let tool = TOOL_EVALUATE_TRUST;

    let trust_score = input["trustScore"]
        .as_i64()
        .ok_or_else(|| protocol_err(tool, "missing 'trustScore'"))?;
    if !(0..=100).contains(&trust_score) {
        return Err(protocol_err(
            tool,
            format!("trustScore {trust_score} outside [0, 100]"),
        ));
    }

    let signals = input["signals"]
        .as_array()
        .ok_or_else(|| protocol_err(tool, "missing 'signals'"))?
        .iter()
        .filter_map(|s| s.as_str().map(String::from))
        .collect();

    let recommendation = input["recommendation"]
        .as_str()
        .ok_or_else(|| protocol_err(tool, "missing 'recommendation'"))?
        .to_string();

    let should_continue = input["shouldContinue"]
        .as_bool()
        .ok_or_else(|| protocol_err(tool, "missing 'shouldContinue'"))?;

    Ok(TrustEvaluation {
        trust_score: trust_score as i32,
        signals,
        recommendation,
        should_continue,
    })
}

fn parse_strategy(input: &serde_json::Value) -> Result<StrategyDecision, AdvisorError> {
    let tool = TOOL_DETERMINE_STRATEGY;

    let action_str = input["action"]
        .as_str()
        .ok_or_else(|| protocol_err(tool, "missing 'action'"))?;
    let action = StrategyAction::parse(action_str)
        .ok_or_else(|| protocol_err(tool, format!("unknown action '{action_str}'")))?;

    let reason = input["reason"]
        .as_str()
        .ok_or_else(|| protocol_err(tool, "missing 'reason'"))?
        .to_string();

    let parameters = input.get("parameters").filter(|p| p.is_object()).cloned();

    Ok(StrategyDecision {
        action,
        reason,
        parameters,
    })
}
