//! Colony placement orchestrator core.
//!
//! The decision and adaptation engine: pulls waiting processes from a
//! colony, decides which executor should run each one against a weighted
//! mix of latency, cost, data movement, throughput, and energy, and learns
//! from reported outcomes.
//!
//! The colony wire protocol, CLI, simulator, and analytics UI are external
//! collaborators; this crate consumes a [`colony::ColonyClient`] and a
//! validated [`cpo_config::DeploymentProfile`].

pub mod adapt;
pub mod audit;
pub mod colony;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod scoring;
