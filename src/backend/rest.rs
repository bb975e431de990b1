use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::filter::{Filter, Query};
use super::realtime::{RealtimeBinding, spawn_channel};
use super::subscription::Subscription;
use super::{DataStore, StoreError};

/// Hosted backend: PostgREST for rows, the realtime websocket for inserts.
pub struct RestStore {
    base_url: String,
    anon_key: String,
    http_client: Client,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            http_client: Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    /// `https://x` becomes `wss://x/realtime/v1/websocket?...`.
    pub fn realtime_url(&self) -> String {
        let socket_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!(
            "{socket_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.anon_key
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl DataStore for RestStore {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        let request = self
            .http_client
            .get(self.table_url(&query.table))
            .query(&query.to_query_params());
        let response = self.authorized(request).send().await?;
        match Self::read_json(response).await? {
            Value::Array(rows) => Ok(rows),
            other => Err(StoreError::Status {
                status: 200,
                body: format!("expected an array of rows, got {other}"),
            }),
        }
    }

    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError> {
        let request = self
            .http_client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&Value::Array(vec![record]));
        let response = self.authorized(request).send().await?;
        match Self::read_json(response).await? {
            Value::Array(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
            Value::Object(row) => Ok(Value::Object(row)),
            other => Err(StoreError::Status {
                status: 200,
                body: format!("insert returned no row: {other}"),
            }),
        }
    }

    fn subscribe_inserts(&self, key: &str, table: &str, filter: Option<Filter>) -> Subscription {
        let binding = RealtimeBinding {
            topic: format!("realtime:{key}"),
            table: table.to_string(),
            filter: filter.as_ref().and_then(Filter::to_realtime_filter),
            client_filter: filter,
        };
        spawn_channel(self.realtime_url(), self.anon_key.clone(), key, binding)
    }
}
