pub mod filter;
pub mod memory;
pub mod realtime;
pub mod rest;
pub mod subscription;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::common::{ChatMessage, NewMessage, RecordId, UserProfile};

pub use filter::{Direction, Filter, Query};
pub use memory::InMemoryStore;
pub use rest::RestStore;
pub use subscription::{Subscription, SubscriptionGuard};

pub const USERS_TABLE: &str = "users";
pub const MESSAGES_TABLE: &str = "messages";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("realtime channel error: {0}")]
    Realtime(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// The hosted table store. Reads and writes are async; subscribing is
/// immediate and the connection is established in the background.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError>;

    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError>;

    fn subscribe_inserts(&self, key: &str, table: &str, filter: Option<Filter>) -> Subscription;
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

/// Typed calls the views make, parameterised by table names.
#[derive(Debug, Clone)]
pub struct Tables {
    pub users: String,
    pub messages: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            users: USERS_TABLE.to_string(),
            messages: MESSAGES_TABLE.to_string(),
        }
    }
}

impl Tables {
    pub async fn fetch_alumni(&self, store: &dyn DataStore) -> Result<Vec<UserProfile>, StoreError> {
        let query = Query::from(&self.users).select(&[
            "id",
            "full_name",
            "username",
            "graduation_year",
            "department",
        ]);
        decode_rows(store.select(&query).await?)
    }

    /// Looks up one profile; `Ok(None)` when no row has that id.
    pub async fn fetch_profile(
        &self,
        store: &dyn DataStore,
        id: &RecordId,
        fields: &[&str],
    ) -> Result<Option<UserProfile>, StoreError> {
        let mut fields = fields.to_vec();
        if !fields.contains(&"id") {
            fields.insert(0, "id");
        }
        let query = Query::from(&self.users)
            .select(&fields)
            .filter(Filter::id_eq("id", id))
            .limit(1);
        let mut rows: Vec<UserProfile> = decode_rows(store.select(&query).await?)?;
        Ok(rows.pop())
    }

    pub async fn fetch_conversation(
        &self,
        store: &dyn DataStore,
        me: &RecordId,
        other: &RecordId,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let query = Query::from(&self.messages)
            .filter(Filter::conversation(me, other))
            .order("timestamp", Direction::Ascending);
        decode_rows(store.select(&query).await?)
    }

    pub async fn send_message(
        &self,
        store: &dyn DataStore,
        message: &NewMessage,
    ) -> Result<ChatMessage, StoreError> {
        let record = serde_json::to_value(message)?;
        let row = store.insert(&self.messages, record).await?;
        Ok(serde_json::from_value(row)?)
    }

    pub fn subscribe_messages(
        &self,
        store: &dyn DataStore,
        key: &str,
        filter: Option<Filter>,
    ) -> Subscription {
        store.subscribe_inserts(key, &self.messages, filter)
    }
}
