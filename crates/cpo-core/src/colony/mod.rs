//! Colony wire adapter: native entity types, the client contract, and
//! conversions into the internal model.
//!
//! The wire protocol itself (gRPC/HTTP, retries, auth) lives in the
//! hosting binary; the engine only requires best-effort at-least-once
//! semantics and stable identifiers.

pub mod client;
pub mod convert;
pub mod types;

pub use client::ColonyClient;
pub use types::{
    ColonyExecutor, ColonyProcess, ColonyStatistics, ExecutorSummary, ProcessSummary,
    ResourceCapacity, TrendPoint,
};
