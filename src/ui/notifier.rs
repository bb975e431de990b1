use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{DataStore, Filter, SubscriptionGuard, Tables};
use crate::common::{InsertEvent, RecordId};
use crate::identity::IdentityContext;

use super::context::ViewContext;
use super::toast::Toaster;

/// Application-wide listener that toasts every message addressed to the
/// signed-in user, wherever they are in the app.
pub struct Notifier {
    subscription: Option<SubscriptionGuard>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Notifier {
    /// A notifier that listens to nothing.
    pub fn idle() -> Self {
        Self {
            subscription: None,
            cancel: None,
            task: None,
        }
    }

    pub fn mount(ctx: &ViewContext, identity: &IdentityContext) -> Self {
        let Some(me) = identity.user_id().cloned() else {
            log::warn!("[notifier] No signed-in user; not listening");
            return Self::idle();
        };

        log::info!("[notifier] Setting up listener for user {me}");
        let key = format!("global-message-listener-{me}-{}", Uuid::new_v4());
        let subscription = {
            let _runtime = ctx.runtime.enter();
            ctx.tables.subscribe_messages(
                ctx.store.as_ref(),
                &key,
                Some(Filter::id_eq("receiver_id", &me)),
            )
        };
        let (guard, mut inserts) = subscription.split();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let store = ctx.store.clone();
        let tables = ctx.tables.clone();
        let toaster = ctx.toaster.clone();
        let task = ctx.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    insert = inserts.recv() => match insert {
                        Some(insert) => notify(&store, &tables, &toaster, &me, insert).await,
                        None => break,
                    },
                }
            }
            log::info!("[notifier] Listener stopped");
        });

        Self {
            subscription: Some(guard),
            cancel: Some(cancel_tx),
            task: Some(task),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn unmount(&mut self) {
        if self.subscription.is_some() {
            log::info!("[notifier] Cleaning up listener");
        }
        if let Some(mut guard) = self.subscription.take() {
            guard.release();
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn notify(
    store: &Arc<dyn DataStore>,
    tables: &Tables,
    toaster: &Toaster,
    me: &RecordId,
    insert: InsertEvent,
) {
    let Some(sender_id) = insert.sender_id() else {
        log::warn!("[notifier] Skipped: sender_id missing in payload");
        return;
    };
    if &sender_id == me {
        return;
    }

    let key = match insert.field_id("id") {
        Some(id) => format!("message:{id}"),
        None => format!("message:{}", Uuid::new_v4()),
    };
    match tables
        .fetch_profile(store.as_ref(), &sender_id, &["full_name"])
        .await
    {
        Ok(Some(sender)) => {
            toaster.info_for(key, format!("📩 New message from {}", sender.full_name));
        }
        Ok(None) => {
            log::warn!("[notifier] Sender {sender_id} not found");
            toaster.info_for(key, "📩 New message received");
        }
        Err(err) => {
            log::warn!("[notifier] Sender lookup for {sender_id} failed: {err}");
            toaster.info_for(key, "📩 New message received");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::backend::InMemoryStore;
    use crate::identity::Identity;
    use crate::storage::LocalStorage;
    use crate::ui::toast::Toast;

    fn setup() -> (InMemoryStore, ViewContext, mpsc::Receiver<Toast>) {
        let store = InMemoryStore::demo();
        let (toaster, toasts) = Toaster::channel();
        let ctx = ViewContext {
            store: Arc::new(store.clone()),
            tables: Tables::default(),
            local_storage: LocalStorage::in_memory().unwrap(),
            toaster,
            runtime: tokio::runtime::Handle::current(),
        };
        (store, ctx, toasts)
    }

    fn me(id: i64) -> IdentityContext {
        IdentityContext::SignedIn(Identity {
            id: id.into(),
            full_name: None,
            username: None,
        })
    }

    async fn collect(toasts: &mut mpsc::Receiver<Toast>) -> Vec<String> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut texts = Vec::new();
        while let Ok(toast) = toasts.try_recv() {
            texts.push(toast.text);
        }
        texts
    }

    #[tokio::test]
    async fn toasts_inbound_messages_with_sender_name() {
        let (store, ctx, mut toasts) = setup();
        let _notifier = Notifier::mount(&ctx, &me(1));

        store.emit_insert("messages", json!({"id": 1, "sender_id": 2, "receiver_id": 1, "content": "hi"}));
        store.emit_insert("messages", json!({"id": 2, "sender_id": 2, "receiver_id": 3, "content": "not mine"}));
        assert_eq!(collect(&mut toasts).await, ["📩 New message from Bob Ray"]);
    }

    #[tokio::test]
    async fn never_toasts_own_or_senderless_rows() {
        let (store, ctx, mut toasts) = setup();
        let _notifier = Notifier::mount(&ctx, &me(1));

        store.emit_insert("messages", json!({"id": 1, "sender_id": 1, "receiver_id": 1, "content": "note to self"}));
        store.emit_insert("messages", json!({"id": 2, "sender_id": null, "receiver_id": 1, "content": "?"}));
        store.emit_insert("messages", json!({"id": 3, "receiver_id": "1", "content": "?"}));
        assert!(collect(&mut toasts).await.is_empty());
    }

    #[tokio::test]
    async fn one_toast_per_event_even_when_lookup_fails() {
        let (store, ctx, mut toasts) = setup();
        let _notifier = Notifier::mount(&ctx, &me(1));

        store.emit_insert("messages", json!({"id": 1, "sender_id": 77, "receiver_id": 1, "content": "who?"}));
        assert_eq!(collect(&mut toasts).await, ["📩 New message received"]);

        store.set_fail_reads(true);
        store.emit_insert("messages", json!({"id": 2, "sender_id": 2, "receiver_id": 1, "content": "a"}));
        store.emit_insert("messages", json!({"id": 3, "sender_id": 2, "receiver_id": 1, "content": "b"}));
        assert_eq!(
            collect(&mut toasts).await,
            ["📩 New message received", "📩 New message received"]
        );
    }

    #[tokio::test]
    async fn signed_out_is_a_no_op() {
        let (store, ctx, mut toasts) = setup();
        let notifier = Notifier::mount(&ctx, &IdentityContext::SignedOut);
        assert!(!notifier.is_listening());
        assert_eq!(store.active_subscriptions(), 0);

        store.emit_insert("messages", json!({"id": 1, "sender_id": 2, "receiver_id": 1, "content": "hi"}));
        assert!(collect(&mut toasts).await.is_empty());
    }

    #[tokio::test]
    async fn remounting_does_not_duplicate_toasts() {
        let (store, ctx, mut toasts) = setup();
        for _ in 0..3 {
            let mut notifier = Notifier::mount(&ctx, &me(1));
            assert_eq!(store.active_subscriptions(), 1);
            notifier.unmount();
            assert_eq!(store.active_subscriptions(), 0);
        }

        let notifier = Notifier::mount(&ctx, &me(1));
        store.emit_insert("messages", json!({"id": 5, "sender_id": 2, "receiver_id": 1, "content": "hi"}));
        assert_eq!(collect(&mut toasts).await.len(), 1);

        drop(notifier);
        assert_eq!(store.active_subscriptions(), 0);
        store.emit_insert("messages", json!({"id": 6, "sender_id": 2, "receiver_id": 1, "content": "hi"}));
        assert!(collect(&mut toasts).await.is_empty());
    }
}
