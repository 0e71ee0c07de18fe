// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Naamio Adaptive Recon Engine
 * Per-target adaptive crawl control: behavioral DNA, trust scoring,
 * LLM-guided mutation
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

// Core data model
pub mod dna;
pub mod types;

// Production error handling
pub mod errors;
pub mod retry;

// Configuration surface
pub mod config;

// Persistence layer
pub mod store;

// DNA mutation and lineage
pub mod mutator;

// Green-light trust scoring and state machine
pub mod scorer;

// Challenge and block detection heuristics
pub mod detection;

// DNA-shaped outbound HTTP
pub mod http_client;

// LLM advisor bridge with offline fallback
pub mod advisor;

// Per-target crawl sessions
pub mod engine;
