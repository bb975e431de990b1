use serde_json::Value;

use super::types::{ChatMessage, RecordId};

/// A row-insert notification pushed by the backend.
///
/// The record is kept untyped: listeners must cope with rows that lack fields
/// they rely on.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertEvent {
    pub table: String,
    pub record: Value,
}

impl InsertEvent {
    pub fn new(table: impl Into<String>, record: Value) -> Self {
        Self {
            table: table.into(),
            record,
        }
    }

    pub fn field_id(&self, field: &str) -> Option<RecordId> {
        self.record.get(field).and_then(RecordId::from_value)
    }

    pub fn sender_id(&self) -> Option<RecordId> {
        self.field_id("sender_id")
    }

    /// Decodes the record as a chat message; `None` when either endpoint or
    /// the id is missing.
    pub fn message(&self) -> Option<ChatMessage> {
        serde_json::from_value(self.record.clone()).ok()
    }
}
