//! Session receipt model
//!
//! One record per customer session, from the first non-zero balance to
//! settlement. Records are appended to the receipt file as JSONL and carry a
//! compact event trail (short keys, epoch-ms timestamps) for later analysis.

use smallvec::SmallVec;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    InProgress,
    /// Balance reached zero.
    Settled,
    /// The session could not continue (e.g. no banknote left to dispense).
    Aborted,
}

impl SessionOutcome {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::InProgress => "in_progress",
            SessionOutcome::Settled => "settled",
            SessionOutcome::Aborted => "aborted",
        }
    }
}

/// A single event in a session's trail.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub t: &'static str,       // event type
    pub ts: u64,               // epoch ms
    pub extra: Option<String>, // additional data
}

impl SessionEvent {
    pub fn new(event_type: &'static str) -> Self {
        Self { t: event_type, ts: epoch_ms(), extra: None }
    }

    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extra = Some(extra.to_string());
        self
    }

    /// Convert to JSON value for short-key format
    fn to_json_value(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("t".to_string(), serde_json::Value::String(self.t.to_string()));
        obj.insert("ts".to_string(), serde_json::Value::Number(self.ts.into()));
        if let Some(x) = &self.extra {
            obj.insert("x".to_string(), serde_json::Value::String(x.clone()));
        }
        serde_json::Value::Object(obj)
    }
}

/// Receipt for one customer session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub sid: String, // UUIDv7 session ID
    pub initial_amount_due: i64,
    pub outcome: SessionOutcome,
    /// Recognised values of collected banknotes, in order.
    pub collected: SmallVec<[i64; 4]>,
    /// Number of banknotes handed back as change.
    pub dispensed: u32,
    pub started_at: u64,       // epoch ms
    pub started_at_iso: String, // RFC 3339, for human-readable receipts
    pub ended_at: Option<u64>, // epoch ms
    pub events: Vec<SessionEvent>,
}

impl SessionRecord {
    pub fn new(initial_amount_due: i64) -> Self {
        Self {
            sid: new_uuid_v7(),
            initial_amount_due,
            outcome: SessionOutcome::InProgress,
            collected: SmallVec::new(),
            dispensed: 0,
            started_at: epoch_ms(),
            started_at_iso: chrono::Utc::now().to_rfc3339(),
            ended_at: None,
            events: Vec::with_capacity(16),
        }
    }

    pub fn add_event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    /// Record a successfully recognised and collected banknote.
    pub fn record_collect(&mut self, value: i64) {
        self.collected.push(value);
        self.add_event(SessionEvent::new("collect").with_extra(&format!("value={value}")));
    }

    /// Record one banknote handed back as change.
    pub fn record_dispense(&mut self, unit_value: i64) {
        self.dispensed += 1;
        self.add_event(SessionEvent::new("dispense").with_extra(&format!("value={unit_value}")));
    }

    /// Mark the session as finished.
    pub fn complete(&mut self, outcome: SessionOutcome) {
        self.outcome = outcome;
        self.ended_at = Some(epoch_ms());
    }

    /// Serialize to the JSONL receipt format.
    pub fn to_json(&self) -> String {
        let mut obj = serde_json::Map::new();
        obj.insert("sid".to_string(), serde_json::Value::String(self.sid.clone()));
        obj.insert("due".to_string(), serde_json::Value::Number(self.initial_amount_due.into()));
        obj.insert(
            "out".to_string(),
            serde_json::Value::String(self.outcome.as_str().to_string()),
        );
        obj.insert(
            "collected".to_string(),
            serde_json::Value::Array(
                self.collected.iter().map(|v| serde_json::Value::Number((*v).into())).collect(),
            ),
        );
        obj.insert("dispensed".to_string(), serde_json::Value::Number(self.dispensed.into()));
        obj.insert("start".to_string(), serde_json::Value::Number(self.started_at.into()));
        obj.insert(
            "start_iso".to_string(),
            serde_json::Value::String(self.started_at_iso.clone()),
        );
        if let Some(ended) = self.ended_at {
            obj.insert("end".to_string(), serde_json::Value::Number(ended.into()));
        }
        obj.insert(
            "events".to_string(),
            serde_json::Value::Array(self.events.iter().map(|e| e.to_json_value()).collect()),
        );
        serde_json::Value::Object(obj).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_in_progress() {
        let record = SessionRecord::new(3);
        assert_eq!(record.initial_amount_due, 3);
        assert_eq!(record.outcome, SessionOutcome::InProgress);
        assert!(record.ended_at.is_none());
        assert!(record.collected.is_empty());
    }

    #[test]
    fn test_collect_and_dispense_trail() {
        let mut record = SessionRecord::new(3);
        record.record_collect(5);
        record.record_dispense(1);
        record.record_dispense(1);
        record.complete(SessionOutcome::Settled);

        assert_eq!(record.collected.as_slice(), &[5]);
        assert_eq!(record.dispensed, 2);
        assert_eq!(record.events.len(), 3);
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_to_json_short_keys() {
        let mut record = SessionRecord::new(1);
        record.add_event(SessionEvent::new("sense").with_extra("stale=both"));
        record.complete(SessionOutcome::Aborted);

        let parsed: serde_json::Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(parsed["sid"], record.sid);
        assert_eq!(parsed["due"], 1);
        assert_eq!(parsed["out"], "aborted");
        assert_eq!(parsed["events"][0]["t"], "sense");
        assert_eq!(parsed["events"][0]["x"], "stale=both");
        assert!(parsed["end"].is_number());
    }

    #[test]
    fn test_uuid_v7_ids_are_unique() {
        let a = SessionRecord::new(0);
        let b = SessionRecord::new(0);
        assert_ne!(a.sid, b.sid);
    }
}
