//! The colony client contract.
//!
//! Implementations wrap the actual wire protocol. The engine requires
//! best-effort at-least-once semantics and stable identifiers; transient
//! transport failures surface as [`Error::TransientRemote`] and are
//! retried on the next tick.

use std::time::Duration;

use cpo_common::Result;

use super::types::{ColonyExecutor, ColonyProcess, ColonyStatistics};

/// Operations the engine needs from the coordination plane.
///
/// Implementations must be safe to share across the orchestrator's
/// loops.
pub trait ColonyClient: Send + Sync {
    /// Register this orchestrator's executor identity with the colony.
    fn register_executor(&self, executor: &ColonyExecutor) -> Result<()>;

    /// Remove the registration on shutdown.
    fn unregister_executor(&self, executor_id: &str) -> Result<()>;

    /// Advertise a function this deployment can orchestrate.
    fn add_function(&self, executor_id: &str, func_name: &str) -> Result<()>;

    /// Pull one waiting process, blocking up to `timeout`. `Ok(None)`
    /// means nothing was waiting.
    fn assign_process(&self, timeout: Duration) -> Result<Option<ColonyProcess>>;

    /// Report successful completion with a result payload.
    fn close_process(&self, process_id: &str, result: &serde_json::Value) -> Result<()>;

    /// Report failure with error messages.
    fn fail_process(&self, process_id: &str, errors: &[String]) -> Result<()>;

    /// Attach a log line to a process.
    fn add_log(&self, process_id: &str, message: &str) -> Result<()>;

    /// Currently registered executors.
    fn get_executors(&self) -> Result<Vec<ColonyExecutor>>;

    /// The colony statistics document.
    fn get_statistics(&self) -> Result<ColonyStatistics>;
}
