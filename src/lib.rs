//! # Redox Self-Play
//!
//! Two competing metabolic-design policies trained against each other with an
//! asynchronous IMPALA actor/learner loop. Construct outcomes are estimated by
//! composing cached single-intervention flux deltas instead of re-solving the
//! full model every step.
//!
//! ## Modules
//!
//! - [`agent`] — Roles, action heads, policy/value network, IMPALA learner
//! - [`vtrace`] — Off-policy corrected value targets
//! - [`cache`] — Delta cache, construct composition, precompute pool
//! - [`env`] — Environment trait and the cache-backed surrogate environment
//! - [`training`] — Rollout workers, coordinator, running statistics
//! - [`checkpoint`] — Compressed weight checkpoints with pruning
//! - [`config`] — TOML configuration loading and validation
//! - [`error`] — Structured error types

#![recursion_limit = "256"]

pub mod agent;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod env;
pub mod error;
pub mod training;
pub mod vtrace;
