use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::common::InsertEvent;

use super::StoreError;
use super::filter::Filter;
use super::subscription::{EVENT_BUFFER, Subscription};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const PHOENIX_TOPIC: &str = "phoenix";

/// One `postgres_changes` INSERT binding on a realtime channel.
#[derive(Debug, Clone)]
pub struct RealtimeBinding {
    pub topic: String,
    pub table: String,
    /// Server-side filter (`column=eq.value`).
    pub filter: Option<String>,
    /// Full predicate, re-checked on every event.
    pub client_filter: Option<Filter>,
}

/// Wire frame of the Phoenix channel protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    pub fn join(binding: &RealtimeBinding, access_token: &str, reference: u64) -> Self {
        let mut change = json!({
            "event": "INSERT",
            "schema": "public",
            "table": binding.table,
        });
        if let Some(filter) = &binding.filter {
            change["filter"] = Value::String(filter.clone());
        }
        let mut message = Self::new(
            &binding.topic,
            "phx_join",
            json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [change],
                },
                "access_token": access_token,
            }),
            reference,
        );
        message.join_ref = message.reference.clone();
        message
    }

    pub fn leave(binding: &RealtimeBinding, reference: u64) -> Self {
        Self::new(&binding.topic, "phx_leave", json!({}), reference)
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self::new(PHOENIX_TOPIC, "heartbeat", json!({}), reference)
    }

    fn to_frame(&self) -> Result<Message, StoreError> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Extracts the inserted row from a `postgres_changes` frame addressed to
/// `binding`; anything else yields `None`.
pub fn decode_insert(message: &PhoenixMessage, binding: &RealtimeBinding) -> Option<InsertEvent> {
    if message.topic != binding.topic || message.event != "postgres_changes" {
        return None;
    }
    let data = message.payload.get("data")?;
    if data.get("type").and_then(Value::as_str) != Some("INSERT") {
        return None;
    }
    let table = data.get("table").and_then(Value::as_str)?;
    if table != binding.table {
        return None;
    }
    let record = data.get("record")?.clone();
    if let Some(filter) = &binding.client_filter {
        if !filter.matches(&record) {
            return None;
        }
    }
    Some(InsertEvent::new(table, record))
}

/// Opens a dedicated socket for one binding. Dropped connections are
/// re-established with backoff until the returned subscription is released
/// or its receiver goes away; releasing sends `phx_leave` and closes the
/// socket.
pub fn spawn_channel(
    url: String,
    access_token: String,
    key: &str,
    binding: RealtimeBinding,
) -> Subscription {
    let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
    let (leave_tx, leave_rx) = oneshot::channel::<()>();
    let topic = binding.topic.clone();

    tokio::spawn(async move {
        run_channel(&url, &access_token, &binding, sender, leave_rx).await;
    });

    Subscription::new(key, receiver, move || {
        if leave_tx.send(()).is_err() {
            log::debug!("[realtime] Channel {topic} already closed");
        }
    })
}

enum ChannelExit {
    Left,
    ListenerGone,
}

async fn run_channel(
    url: &str,
    access_token: &str,
    binding: &RealtimeBinding,
    sender: mpsc::Sender<InsertEvent>,
    mut leave: oneshot::Receiver<()>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match run_session(url, access_token, binding, &sender, &mut leave, &mut backoff).await {
            Ok(ChannelExit::Left) => {
                log::info!("[realtime] Left {}", binding.topic);
                return;
            }
            Ok(ChannelExit::ListenerGone) => {
                log::debug!("[realtime] Listener for {} dropped", binding.topic);
                return;
            }
            Err(err) => {
                log::warn!(
                    "[realtime] Channel {} interrupted: {err}; reconnecting in {backoff:?}",
                    binding.topic
                );
            }
        }

        tokio::select! {
            _ = &mut leave => return,
            _ = sender.closed() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// One connection: connect, join, then pump frames until the connection
/// fails or the channel is left. `backoff` is reset once the join is acked.
async fn run_session(
    url: &str,
    access_token: &str,
    binding: &RealtimeBinding,
    sender: &mpsc::Sender<InsertEvent>,
    leave: &mut oneshot::Receiver<()>,
    backoff: &mut Duration,
) -> Result<ChannelExit, StoreError> {
    let (socket, _) = tokio::select! {
        _ = &mut *leave => return Ok(ChannelExit::Left),
        _ = sender.closed() => return Ok(ChannelExit::ListenerGone),
        connected = connect_async(url) => {
            connected.map_err(|err| StoreError::Realtime(err.to_string()))?
        }
    };
    let (mut sink, mut stream) = socket.split();
    let mut reference: u64 = 1;

    sink.send(PhoenixMessage::join(binding, access_token, reference).to_frame()?)
        .await
        .map_err(|err| StoreError::Realtime(err.to_string()))?;
    log::info!("[realtime] Joining {} on {}", binding.topic, binding.table);

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = &mut *leave => {
                send_leave(&mut sink, binding, reference + 1).await;
                return Ok(ChannelExit::Left);
            }
            _ = sender.closed() => {
                send_leave(&mut sink, binding, reference + 1).await;
                return Ok(ChannelExit::ListenerGone);
            }
            _ = heartbeat.tick() => {
                reference += 1;
                sink.send(PhoenixMessage::heartbeat(reference).to_frame()?)
                    .await
                    .map_err(|err| StoreError::Realtime(err.to_string()))?;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let message: PhoenixMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(err) => {
                            log::debug!("[realtime] Ignoring unparseable frame: {err}");
                            continue;
                        }
                    };
                    match message.event.as_str() {
                        "phx_reply" if message.topic == binding.topic => {
                            let status = message.payload.get("status").and_then(Value::as_str);
                            log::info!("[realtime] {} subscription status: {status:?}", binding.topic);
                            if status == Some("ok") {
                                *backoff = INITIAL_BACKOFF;
                            }
                        }
                        "phx_error" | "phx_close" if message.topic == binding.topic => {
                            return Err(StoreError::Realtime(format!(
                                "{} on {}",
                                message.event, binding.topic
                            )));
                        }
                        _ => {
                            if let Some(event) = decode_insert(&message, binding) {
                                if sender.send(event).await.is_err() {
                                    return Ok(ChannelExit::ListenerGone);
                                }
                            }
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(StoreError::Realtime("closed by server".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(StoreError::Realtime(err.to_string())),
            }
        }
    }
}

async fn send_leave<S>(sink: &mut S, binding: &RealtimeBinding, reference: u64)
where
    S: Sink<Message> + Unpin,
{
    if let Ok(frame) = PhoenixMessage::leave(binding, reference).to_frame() {
        let _ = sink.send(frame).await;
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::common::RecordId;

    fn binding() -> RealtimeBinding {
        let filter = Filter::id_eq("receiver_id", &RecordId::from(1));
        RealtimeBinding {
            topic: "realtime:global-message-listener-1".into(),
            table: "messages".into(),
            filter: filter.to_realtime_filter(),
            client_filter: Some(filter),
        }
    }

    fn change(topic: &str, kind: &str, record: Value) -> PhoenixMessage {
        PhoenixMessage {
            topic: topic.into(),
            event: "postgres_changes".into(),
            payload: json!({
                "data": {
                    "schema": "public",
                    "table": "messages",
                    "type": kind,
                    "record": record,
                    "commit_timestamp": "2024-05-01T10:00:00Z",
                },
                "ids": [1],
            }),
            reference: None,
            join_ref: None,
        }
    }

    #[test]
    fn join_frame_carries_filter() {
        let join = PhoenixMessage::join(&binding(), "anon", 1);
        let encoded = serde_json::to_value(&join).unwrap();
        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "1");
        assert_eq!(encoded["join_ref"], "1");
        assert_eq!(
            encoded["payload"]["config"]["postgres_changes"][0]["filter"],
            "receiver_id=eq.1"
        );
    }

    #[test]
    fn decodes_matching_insert_only() {
        let binding = binding();
        let record = json!({"id": 9, "sender_id": 2, "receiver_id": 1, "content": "hi"});

        let event = decode_insert(&change(&binding.topic, "INSERT", record.clone()), &binding);
        assert_eq!(event.map(|e| e.record), Some(record.clone()));

        assert!(decode_insert(&change("realtime:other", "INSERT", record.clone()), &binding).is_none());
        assert!(decode_insert(&change(&binding.topic, "UPDATE", record), &binding).is_none());

        let elsewhere = json!({"id": 10, "sender_id": 2, "receiver_id": 3, "content": "x"});
        assert!(decode_insert(&change(&binding.topic, "INSERT", elsewhere), &binding).is_none());
    }

    #[tokio::test]
    async fn rejoins_after_server_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/realtime/v1/websocket", listener.local_addr().unwrap());
        let binding = binding();
        let topic = binding.topic.clone();
        let record = json!({"id": 9, "sender_id": 2, "receiver_id": 1, "content": "hi"});
        let pushed = change(&topic, "INSERT", record.clone());

        let server = tokio::spawn(async move {
            let mut joins = 0;
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut socket = accept_async(stream).await.unwrap();
                let frame = socket.next().await.unwrap().unwrap();
                let join: PhoenixMessage = serde_json::from_str(frame.to_text().unwrap()).unwrap();
                assert_eq!(join.event, "phx_join");
                joins += 1;
                if joins == 1 {
                    let _ = socket.close(None).await;
                    continue;
                }

                let frame = serde_json::to_string(&pushed).unwrap();
                socket.send(Message::Text(frame.into())).await.unwrap();
                while let Some(Ok(message)) = socket.next().await {
                    if message.is_close() {
                        break;
                    }
                }
                return joins;
            }
        });

        let mut subscription = spawn_channel(url, "anon".into(), "k", binding);
        let event = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .expect("no event after reconnect")
            .expect("channel ended");
        assert_eq!(event.record, record);

        subscription.unsubscribe();
        let joins = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("client never left")
            .unwrap();
        assert_eq!(joins, 2);
    }
}
