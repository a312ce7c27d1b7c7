//! Process, executor, and decision identity types.
//!
//! Colony-assigned identifiers (process and executor ids) are opaque
//! strings owned by the coordination plane. Decision ids are minted here
//! and link every placement to its eventual outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Colony-assigned process identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub String);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(s: &str) -> Self {
        ProcessId(s.to_string())
    }
}

/// Colony-assigned executor identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(pub String);

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExecutorId {
    fn from(s: &str) -> Self {
        ExecutorId(s.to_string())
    }
}

/// Identifier for one orchestrator run (one construction of the engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decision ID linking a placement to its outcome.
///
/// Format: `dec-YYYYMMDD-HHMMSS-XXXX`
/// Example: `dec-20260801-143022-a7xq`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub String);

impl DecisionId {
    /// Mint a new decision ID for the current instant.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let suffix = generate_base32_suffix();
        DecisionId(format!(
            "dec-{}-{}-{}",
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            suffix
        ))
    }

    /// Parse an existing decision ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 24 || !s.starts_with("dec-") {
            return None;
        }
        let bytes = s.as_bytes();
        if bytes[12] != b'-' || bytes[19] != b'-' {
            return None;
        }
        let date = &s[4..12];
        let time = &s[13..19];
        let suffix = &s[20..24];
        if !date.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !time.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(DecisionId(s.to_string()))
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Four base32 (RFC 4648 lowercase, no padding) characters from a v4 UUID.
fn generate_base32_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let mut out = String::with_capacity(4);
    for i in 0..4 {
        let idx = (bytes[i] as usize) % ALPHABET.len();
        out.push(ALPHABET[idx] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_id_round_trips_through_parse() {
        let id = DecisionId::new();
        let parsed = DecisionId::parse(&id.0).expect("freshly minted id should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn decision_id_rejects_malformed() {
        assert!(DecisionId::parse("").is_none());
        assert!(DecisionId::parse("dec-20260801-143022").is_none());
        assert!(DecisionId::parse("ses-20260801-143022-a7xq").is_none());
        assert!(DecisionId::parse("dec-2026o801-143022-a7xq").is_none());
        assert!(DecisionId::parse("dec-20260801-143022-A7XQ").is_none());
        assert!(DecisionId::parse("dec-20260801-143022-a7x1").is_none());
    }

    #[test]
    fn decision_ids_are_unique() {
        let a = DecisionId::new();
        let b = DecisionId::new();
        // Same second is likely; the suffix disambiguates.
        assert_ne!(a, b);
    }

    #[test]
    fn process_id_serde_is_transparent() {
        let id = ProcessId::from("proc-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"proc-42\"");
        let back: ProcessId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn executor_ids_order_stably() {
        let mut ids = vec![
            ExecutorId::from("exec-c"),
            ExecutorId::from("exec-a"),
            ExecutorId::from("exec-b"),
        ];
        ids.sort();
        assert_eq!(ids[0].0, "exec-a");
        assert_eq!(ids[2].0, "exec-c");
    }
}
