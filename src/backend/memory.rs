use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use crate::common::InsertEvent;

use super::filter::{Direction, Filter, Query, compare_values};
use super::subscription::{EVENT_BUFFER, Subscription};
use super::{DataStore, StoreError};

struct Subscriber {
    key: String,
    table: String,
    filter: Option<Filter>,
    sender: mpsc::Sender<InsertEvent>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
    inserts: Vec<(String, Value)>,
}

/// Process-local table store with realtime fan-out.
///
/// Backs the offline demo mode and the view tests; subscriptions are filtered
/// here the same way the hosted service filters them.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
    next_id: Arc<AtomicI64>,
    fail_reads: Arc<AtomicBool>,
    fail_inserts: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with a handful of alumni for offline use.
    pub fn demo() -> Self {
        let store = Self::new();
        let alumni = [
            (1, "Ann Lee", "al1", 2019, "Physics"),
            (2, "Bob Ray", "br2", 2017, "Computer Science"),
            (3, "Chidi Okafor", "chidi", 2021, "Philosophy"),
            (4, "Dana Kim", "dkim", 2015, "Mechanical Engineering"),
        ];
        for (id, full_name, username, year, department) in alumni {
            store.seed(
                "users",
                json!({
                    "id": id,
                    "full_name": full_name,
                    "username": username,
                    "graduation_year": year,
                    "department": department,
                }),
            );
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge the remaining ones.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a row without emitting realtime events.
    pub fn seed(&self, table: &str, record: Value) {
        if let Some(id) = record.get("id").and_then(Value::as_i64) {
            self.next_id.fetch_max(id, Ordering::SeqCst);
        }
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Every record passed to `insert`, in call order, as received.
    pub fn insert_log(&self) -> Vec<(String, Value)> {
        self.lock().inserts.clone()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Pushes an insert event to matching subscribers without storing the row,
    /// the way another client's write would arrive.
    pub fn emit_insert(&self, table: &str, record: Value) {
        let mut inner = self.lock();
        inner.subscribers.retain(|id, subscriber| {
            if subscriber.table != table {
                return true;
            }
            if let Some(filter) = &subscriber.filter {
                if !filter.matches(&record) {
                    return true;
                }
            }
            match subscriber.sender.try_send(InsertEvent::new(table, record.clone())) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("Subscriber {} lagging; dropping event", subscriber.key);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("Subscriber {id} gone; removing");
                    false
                }
            }
        });
    }
}

fn project(record: &Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return record.clone();
    }
    let mut projected = Map::new();
    for field in fields {
        if let Some(value) = record.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    Value::Object(projected)
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        let inner = self.lock();
        let mut rows: Vec<&Value> = inner
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.as_ref().is_none_or(|filter| filter.matches(row)))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(&order.field).unwrap_or(&Value::Null),
                    b.get(&order.field).unwrap_or(&Value::Null),
                );
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|row| project(row, &query.select))
            .collect())
    }

    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError> {
        self.lock().inserts.push((table.to_string(), record.clone()));
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("inserts disabled".to_string()));
        }

        let Value::Object(mut row) = record else {
            return Err(StoreError::Unavailable("record must be an object".to_string()));
        };
        row.entry("id")
            .or_insert_with(|| Value::from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        row.entry("timestamp")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        let row = Value::Object(row);

        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        self.emit_insert(table, row.clone());
        Ok(row)
    }

    fn subscribe_inserts(&self, key: &str, table: &str, filter: Option<Filter>) -> Subscription {
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let id = {
            let mut inner = self.lock();
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner.subscribers.insert(
                id,
                Subscriber {
                    key: key.to_string(),
                    table: table.to_string(),
                    filter,
                    sender,
                },
            );
            id
        };
        log::info!("[memory] Subscription {key} on {table} established");

        let inner = self.inner.clone();
        let key_owned = key.to_string();
        Subscription::new(key, receiver, move || {
            let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if inner.subscribers.remove(&id).is_some() {
                log::info!("[memory] Subscription {key_owned} released");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordId;

    #[tokio::test]
    async fn insert_assigns_id_and_notifies_matching_subscribers() {
        let store = InMemoryStore::new();
        let mut scoped = store.subscribe_inserts(
            "scoped",
            "messages",
            Some(Filter::id_eq("receiver_id", &RecordId::from(1))),
        );
        let mut open = store.subscribe_inserts("open", "messages", None);

        store
            .insert("messages", json!({"sender_id": 2, "receiver_id": 3, "content": "a"}))
            .await
            .unwrap();
        let row = store
            .insert("messages", json!({"sender_id": 2, "receiver_id": 1, "content": "b"}))
            .await
            .unwrap();
        assert!(row.get("id").is_some());
        assert!(row.get("timestamp").is_some());

        assert_eq!(scoped.next().await.unwrap().record["content"], "b");
        assert_eq!(open.next().await.unwrap().record["content"], "a");
        assert_eq!(open.next().await.unwrap().record["content"], "b");
    }

    #[tokio::test]
    async fn select_filters_orders_and_projects() {
        let store = InMemoryStore::demo();
        let query = Query::from("users")
            .select(&["id", "full_name"])
            .order("graduation_year", Direction::Descending)
            .limit(2);
        let rows = store.select(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({"id": 3, "full_name": "Chidi Okafor"}));
        assert!(rows[1].get("username").is_none());
    }

    #[tokio::test]
    async fn release_removes_subscriber() {
        let store = InMemoryStore::new();
        let subscription = store.subscribe_inserts("k", "messages", None);
        assert_eq!(store.active_subscriptions(), 1);
        subscription.unsubscribe();
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn failure_injection() {
        let store = InMemoryStore::demo();
        store.set_fail_reads(true);
        assert!(store.select(&Query::from("users")).await.is_err());
        store.set_fail_inserts(true);
        assert!(store.insert("messages", json!({})).await.is_err());
        assert_eq!(store.insert_log().len(), 1);
    }
}
