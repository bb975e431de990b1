use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Row id as delivered by the backend.
///
/// Tables may use integer or text keys, and route parameters always arrive as
/// text, so ids are kept in canonical string form and compared as such.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    /// Reads an id out of a JSON value. Numbers and non-empty strings are ids,
    /// anything else is not.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Self(number.to_string())),
            Value::String(text) if !text.trim().is_empty() => Some(Self::new(text.as_str())),
            _ => None,
        }
    }

    /// Canonical integers go back to the backend as numbers; anything that
    /// would not print back the same (`007`, `+7`) stays text.
    pub fn to_value(&self) -> Value {
        match self.0.parse::<i64>() {
            Ok(number) if number.to_string() == self.0 => Value::from(number),
            _ => Value::String(self.0.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RecordId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid record id: {value}")))
    }
}

/// An alumni profile row from the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: RecordId,
    pub full_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub department: Option<String>,
}

impl UserProfile {
    /// Header text for a chat page, `Full Name (@username)`.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) => format!("{} (@{})", self.full_name, username),
            None => self.full_name.clone(),
        }
    }

    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or("")
    }
}

/// Domain model for one row of the `messages` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: RecordId,
    pub sender_id: RecordId,
    pub receiver_id: RecordId,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    /// Whether the message travels between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &RecordId, b: &RecordId) -> bool {
        (&self.sender_id == a && &self.receiver_id == b)
            || (&self.sender_id == b && &self.receiver_id == a)
    }

    /// Parses the backend timestamp; both `timestamptz` and bare `timestamp`
    /// renderings are accepted, the latter read as UTC.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Outgoing message before the backend assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub sender_id: RecordId,
    pub receiver_id: RecordId,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_ids_compare_across_json_types() {
        let from_number: RecordId = serde_json::from_value(json!(7)).unwrap();
        let from_text: RecordId = serde_json::from_value(json!("7")).unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(serde_json::to_value(&from_text).unwrap(), json!(7));

        let uuid = RecordId::new("0b7c6d52-2a55-4e0e-9c1c-6f8f6a3e7a10");
        assert_eq!(uuid.to_value(), json!("0b7c6d52-2a55-4e0e-9c1c-6f8f6a3e7a10"));
        assert!(RecordId::from_value(&json!(null)).is_none());
        assert!(RecordId::from_value(&json!("  ")).is_none());
    }

    #[test]
    fn non_canonical_numeric_text_stays_text() {
        assert_eq!(RecordId::new("007").to_value(), json!("007"));
        assert_eq!(RecordId::new("+7").to_value(), json!("+7"));
        assert_eq!(RecordId::new("-7").to_value(), json!(-7));
        assert_eq!(RecordId::new("42").to_value(), json!(42));
    }

    #[test]
    fn message_direction_is_symmetric() {
        let message = ChatMessage {
            id: 1.into(),
            sender_id: 1.into(),
            receiver_id: 2.into(),
            content: "hi".into(),
            timestamp: None,
        };
        assert!(message.is_between(&1.into(), &2.into()));
        assert!(message.is_between(&2.into(), &1.into()));
        assert!(!message.is_between(&1.into(), &3.into()));
    }

    #[test]
    fn timestamps_with_and_without_zone_parse() {
        let mut message = ChatMessage {
            id: 1.into(),
            sender_id: 1.into(),
            receiver_id: 2.into(),
            content: String::new(),
            timestamp: Some("2024-05-01T10:15:30.123456+00:00".into()),
        };
        assert!(message.sent_at().is_some());
        message.timestamp = Some("2024-05-01T10:15:30.123456".into());
        assert!(message.sent_at().is_some());
        message.timestamp = Some("yesterday".into());
        assert!(message.sent_at().is_none());
    }

    #[test]
    fn profile_names() {
        let profile = UserProfile {
            id: 2.into(),
            full_name: "Ann Lee".into(),
            username: Some("al1".into()),
            graduation_year: Some(2019),
            department: Some("Physics".into()),
        };
        assert_eq!(profile.display_name(), "Ann Lee (@al1)");
        assert_eq!(profile.first_name(), "Ann");
    }
}
