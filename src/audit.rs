//! Per-record audit history.
//!
//! Every save or delete performed by the per-record store appends one
//! [`AuditEntry`] to the record's own trail. Trails only grow: the store reads
//! the existing trail, appends, and writes the whole trail back in its original
//! order. Pruning is left to external maintenance tooling.

use crate::statics;
use crate::store::Timestamp;
use crate::value::{FieldValue, Fields};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(deserialize_with = "crate::store::iso8601::deserialize")]
    pub timestamp: Timestamp,
    /// Kept as the raw string so trails written by other tools survive a re-save unchanged.
    pub action: String,
    #[serde(default)]
    pub details: Fields,
}

impl AuditEntry {
    pub fn saved(at: Timestamp, field_count: usize) -> Self {
        let mut details = Fields::new();
        details.insert(
            statics::DETAIL_FIELD_COUNT.to_string(),
            FieldValue::from(field_count as i64),
        );
        Self {
            timestamp: at,
            action: statics::ACTION_SAVE.to_string(),
            details,
        }
    }

    pub fn deleted(at: Timestamp, archived_as: &str) -> Self {
        let mut details = Fields::new();
        details.insert(
            statics::DETAIL_ARCHIVED_AS.to_string(),
            FieldValue::from(archived_as),
        );
        Self {
            timestamp: at,
            action: statics::ACTION_DELETE.to_string(),
            details,
        }
    }

    pub fn is_save(&self) -> bool {
        self.action == statics::ACTION_SAVE
    }

    pub fn is_delete(&self) -> bool {
        self.action == statics::ACTION_DELETE
    }
}

/// Append-only sequence of audit entries. There is deliberately no way to
/// remove or reorder entries through this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail(Vec<AuditEntry>);

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: AuditEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.0
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AuditEntry> {
        self.0.iter()
    }

    pub fn into_entries(self) -> Vec<AuditEntry> {
        self.0
    }
}

impl<'a> IntoIterator for &'a AuditTrail {
    type Item = &'a AuditEntry;
    type IntoIter = std::slice::Iter<'a, AuditEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditEntry, AuditTrail};
    use crate::statics;

    fn ts(s: &str) -> crate::store::Timestamp {
        chrono::DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut trail = AuditTrail::new();
        trail.append(AuditEntry::saved(ts("2025-01-02T00:00:00+00:00"), 2));
        trail.append(AuditEntry::saved(ts("2025-01-01T00:00:00+00:00"), 3));
        trail.append(AuditEntry::deleted(ts("2025-01-03T00:00:00+00:00"), "x.json"));

        let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![statics::ACTION_SAVE, statics::ACTION_SAVE, statics::ACTION_DELETE]
        );
        // Not re-sorted by timestamp.
        assert_eq!(trail.entries()[1].timestamp, ts("2025-01-01T00:00:00+00:00"));
        assert!(trail.last().unwrap().is_delete());
    }

    #[test]
    fn trail_serializes_verbatim_including_foreign_actions() {
        let json = r#"[
  {"timestamp": "2025-01-01T09:00:00+09:00", "action": "imported", "details": {"source": "legacy"}},
  {"timestamp": "2025-01-02T09:00:00+09:00", "action": "save_process", "details": {"field_count": 4}}
]"#;
        let trail: AuditTrail = serde_json::from_str(json).unwrap();
        assert_eq!(trail.len(), 2);
        assert!(!trail.entries()[0].is_save());
        assert!(trail.entries()[1].is_save());

        let back: serde_json::Value = serde_json::to_value(&trail).unwrap();
        let orig: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(back, orig);
    }

    #[test]
    fn save_entry_records_field_count() {
        let e = AuditEntry::saved(ts("2025-01-01T00:00:00+00:00"), 5);
        assert_eq!(
            e.details
                .get(statics::DETAIL_FIELD_COUNT)
                .and_then(|v| v.as_i64()),
            Some(5)
        );
    }
}
