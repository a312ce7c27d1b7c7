//! Append-only audit trail for decisions and policy evaluations.
//!
//! Each entry follows a consistent schema with:
//! - Timestamp (ISO-8601)
//! - Event type (decision, policy_check, safety_gate, outcome, lifecycle,
//!   error)
//! - Run/decision context for correlation
//! - Hash chain fields for integrity
//!
//! The engine keeps a bounded in-memory ring; an optional sink receives
//! every entry for external persistence. `verify_chain` walks a slice of
//! entries and reports the first break.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use cpo_common::{DecisionId, RunId};

/// Schema version for audit log entries.
pub const AUDIT_SCHEMA_VERSION: &str = "1.0.0";
/// Default ring capacity.
pub const DEFAULT_RING_CAPACITY: usize = 512;
/// Hash seed for the first entry of a chain.
pub const GENESIS_HASH: &str = "genesis";

/// Types of events recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A placement decision was produced.
    Decision,
    /// Policy rules evaluated for a (process, executor) pair.
    PolicyCheck,
    /// The safety gate forced local execution.
    SafetyGate,
    /// An outcome was applied to the learners.
    Outcome,
    /// Orchestrator lifecycle event (started, stopped).
    Lifecycle,
    /// Error encountered during operation.
    Error,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditEventType::Decision => "decision",
            AuditEventType::PolicyCheck => "policy_check",
            AuditEventType::SafetyGate => "safety_gate",
            AuditEventType::Outcome => "outcome",
            AuditEventType::Lifecycle => "lifecycle",
            AuditEventType::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Schema version for forward compatibility.
    pub schema_version: String,
    pub ts: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// The orchestrator run this entry belongs to.
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<DecisionId>,
    /// Policy rule ids involved, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_ids: Vec<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// SHA-256 of the previous entry, or "genesis".
    pub prev_hash: String,
    /// SHA-256 of this entry excluding this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

impl AuditEntry {
    /// Hex SHA-256 over the canonical serialization minus `entry_hash`.
    pub fn compute_hash(&self) -> String {
        let mut unhashed = self.clone();
        unhashed.entry_hash = None;
        let bytes = serde_json::to_vec(&unhashed).expect("audit entries always serialize");
        let digest = Sha256::digest(&bytes);
        hex::encode(digest)
    }

    /// Whether the stored hash matches the recomputed one.
    pub fn hash_is_valid(&self) -> bool {
        match &self.entry_hash {
            Some(stored) => *stored == self.compute_hash(),
            None => false,
        }
    }
}

/// Receives every appended entry, e.g. a JSONL writer owned by the host.
pub trait AuditSink: Send {
    fn emit(&mut self, entry: &AuditEntry);
}

/// Bounded, hash-chained audit log.
pub struct AuditLog {
    run_id: RunId,
    ring: VecDeque<AuditEntry>,
    capacity: usize,
    last_hash: String,
    appended: u64,
    sink: Option<Box<dyn AuditSink>>,
}

impl AuditLog {
    pub fn new(run_id: RunId) -> Self {
        Self::with_capacity(run_id, DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(run_id: RunId, capacity: usize) -> Self {
        Self {
            run_id,
            ring: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            last_hash: GENESIS_HASH.to_string(),
            appended: 0,
            sink: None,
        }
    }

    /// Attach a sink; every subsequent append is mirrored to it.
    pub fn set_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.sink = Some(sink);
    }

    /// Append one event and return the entry's hash.
    pub fn append(
        &mut self,
        event_type: AuditEventType,
        decision_id: Option<DecisionId>,
        rule_ids: Vec<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> String {
        let mut entry = AuditEntry {
            schema_version: AUDIT_SCHEMA_VERSION.to_string(),
            ts: Utc::now(),
            event_type,
            run_id: self.run_id,
            decision_id,
            rule_ids,
            message: message.into(),
            details,
            prev_hash: self.last_hash.clone(),
            entry_hash: None,
        };
        let hash = entry.compute_hash();
        entry.entry_hash = Some(hash.clone());

        if let Some(sink) = &mut self.sink {
            sink.emit(&entry);
        }
        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(entry);
        self.last_hash = hash.clone();
        self.appended += 1;
        hash
    }

    /// Entries currently held in the ring, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.ring.iter().cloned().collect()
    }

    /// Total entries ever appended (the ring may have dropped older
    /// ones).
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

/// Verify a contiguous slice of entries; returns the index of the first
/// broken link, or `Ok(())`.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<(), usize> {
    for (i, entry) in entries.iter().enumerate() {
        if !entry.hash_is_valid() {
            return Err(i);
        }
        if i > 0 {
            let expected_prev = entries[i - 1]
                .entry_hash
                .as_deref()
                .unwrap_or(GENESIS_HASH);
            if entry.prev_hash != expected_prev {
                return Err(i);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn log() -> AuditLog {
        AuditLog::new(RunId::new())
    }

    #[test]
    fn first_entry_chains_from_genesis() {
        let mut audit = log();
        audit.append(
            AuditEventType::Lifecycle,
            None,
            vec![],
            "orchestrator started",
            None,
        );
        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prev_hash, GENESIS_HASH);
        assert!(entries[0].hash_is_valid());
    }

    #[test]
    fn chain_verifies_and_detects_tampering() {
        let mut audit = log();
        for i in 0..5 {
            audit.append(
                AuditEventType::Decision,
                Some(DecisionId::new()),
                vec![],
                format!("decision {}", i),
                None,
            );
        }
        let mut entries = audit.entries();
        verify_chain(&entries).unwrap();

        entries[2].message = "rewritten".into();
        assert_eq!(verify_chain(&entries), Err(2));
    }

    #[test]
    fn broken_link_is_detected() {
        let mut audit = log();
        for _ in 0..3 {
            audit.append(AuditEventType::Outcome, None, vec![], "outcome", None);
        }
        let mut entries = audit.entries();
        // Re-seal entry 1 with a bogus prev hash: the entry's own hash is
        // valid but the link to entry 0 is broken.
        entries[1].prev_hash = "0000".into();
        entries[1].entry_hash = Some(entries[1].compute_hash());
        assert_eq!(verify_chain(&entries), Err(1));
    }

    #[test]
    fn ring_is_bounded_but_counts_everything() {
        let mut audit = AuditLog::with_capacity(RunId::new(), 10);
        for i in 0..25 {
            audit.append(
                AuditEventType::PolicyCheck,
                None,
                vec!["security-floor".into()],
                format!("check {}", i),
                None,
            );
        }
        assert_eq!(audit.entries().len(), 10);
        assert_eq!(audit.appended(), 25);
        // The surviving window still verifies as a chain.
        verify_chain(&audit.entries()).unwrap();
    }

    #[test]
    fn sink_receives_every_entry() {
        struct Collector(Arc<Mutex<Vec<String>>>);
        impl AuditSink for Collector {
            fn emit(&mut self, entry: &AuditEntry) {
                self.0.lock().unwrap().push(entry.message.clone());
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut audit = AuditLog::with_capacity(RunId::new(), 2);
        audit.set_sink(Box::new(Collector(seen.clone())));
        for i in 0..5 {
            audit.append(AuditEventType::Error, None, vec![], format!("e{}", i), None);
        }
        // The sink saw all five even though the ring holds two.
        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn details_round_trip_through_serialization() {
        let mut audit = log();
        audit.append(
            AuditEventType::Decision,
            Some(DecisionId::new()),
            vec!["capability-floor".into()],
            "dispatched",
            Some(serde_json::json!({"target": "e-cloud", "score": 0.71})),
        );
        let json = serde_json::to_string(&audit.entries()[0]).unwrap();
        let restored: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, audit.entries()[0]);
        assert!(restored.hash_is_valid());
    }
}
