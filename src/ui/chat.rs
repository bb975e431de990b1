use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::SubscriptionGuard;
use crate::common::{ChatMessage, NewMessage, RecordId, UserProfile};
use crate::identity::IdentityContext;

use super::context::ViewContext;
use super::state::LoadState;

const CHAT_EVENT_BUFFER: usize = 100;

enum ChatEvent {
    Header(LoadState<UserProfile>),
    History(LoadState<Vec<ChatMessage>>),
    Incoming(ChatMessage),
    Sent(ChatMessage),
    SendFailed { content: String },
}

/// One-to-one conversation page for the route `/chat/:id`.
///
/// Background work reports back through a channel drained by
/// [`ChatView::handle_events`]; unmounting releases the realtime
/// subscription and aborts whatever is still in flight.
pub struct ChatView {
    ctx: ViewContext,
    me: IdentityContext,
    target: RecordId,
    pub header: LoadState<UserProfile>,
    pub history: LoadState<()>,
    messages: Vec<ChatMessage>,
    seen: HashSet<RecordId>,
    pub draft: String,
    sending: bool,
    scroll_to_bottom: bool,
    sender: mpsc::Sender<ChatEvent>,
    events: mpsc::Receiver<ChatEvent>,
    tasks: Vec<JoinHandle<()>>,
    subscription: Option<SubscriptionGuard>,
    cancel: Option<oneshot::Sender<()>>,
}

impl ChatView {
    pub fn mount(ctx: &ViewContext, me: IdentityContext, target: RecordId) -> Self {
        let (sender, events) = mpsc::channel(CHAT_EVENT_BUFFER);
        let mut view = Self {
            ctx: ctx.clone(),
            me,
            target,
            header: LoadState::Loading,
            history: LoadState::Loading,
            messages: Vec::new(),
            seen: HashSet::new(),
            draft: String::new(),
            sending: false,
            scroll_to_bottom: false,
            sender,
            events,
            tasks: Vec::new(),
            subscription: None,
            cancel: None,
        };

        view.load_header();
        match view.me.user_id().cloned() {
            Some(me) => {
                view.load_history(&me);
                view.listen(&me);
            }
            None => {
                log::warn!("[chat] Not signed in; conversation with {} not loaded", view.target);
                view.history = LoadState::Failed("not signed in".to_string());
            }
        }
        view
    }

    fn load_header(&mut self) {
        let store = self.ctx.store.clone();
        let tables = self.ctx.tables.clone();
        let target = self.target.clone();
        let sender = self.sender.clone();
        self.tasks.push(self.ctx.runtime.spawn(async move {
            let header = match tables
                .fetch_profile(store.as_ref(), &target, &["full_name", "username"])
                .await
            {
                Ok(Some(profile)) => LoadState::Ready(profile),
                Ok(None) => LoadState::Failed(format!("no user with id {target}")),
                Err(err) => {
                    log::warn!("[chat] Failed to load profile {target}: {err}");
                    LoadState::Failed(err.to_string())
                }
            };
            let _ = sender.send(ChatEvent::Header(header)).await;
        }));
    }

    fn load_history(&mut self, me: &RecordId) {
        let store = self.ctx.store.clone();
        let tables = self.ctx.tables.clone();
        let me = me.clone();
        let target = self.target.clone();
        let sender = self.sender.clone();
        self.tasks.push(self.ctx.runtime.spawn(async move {
            let result = tables.fetch_conversation(store.as_ref(), &me, &target).await;
            if let Err(err) = &result {
                log::warn!("[chat] Failed to load history with {target}: {err}");
            }
            let _ = sender
                .send(ChatEvent::History(LoadState::from_result(result)))
                .await;
        }));
    }

    /// Subscribes to every insert on the messages table and forwards the ones
    /// belonging to this conversation.
    fn listen(&mut self, me: &RecordId) {
        let key = format!("chat-{me}-{}-{}", self.target, Uuid::new_v4());
        let subscription = {
            let _runtime = self.ctx.runtime.enter();
            self.ctx
                .tables
                .subscribe_messages(self.ctx.store.as_ref(), &key, None)
        };
        let (guard, mut inserts) = subscription.split();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let me = me.clone();
        let target = self.target.clone();
        let sender = self.sender.clone();

        self.tasks.push(self.ctx.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    insert = inserts.recv() => {
                        let Some(insert) = insert else { break };
                        let Some(message) = insert.message() else {
                            log::debug!("[chat] Skipping incomplete message row");
                            continue;
                        };
                        if !message.is_between(&me, &target) {
                            continue;
                        }
                        if sender.send(ChatEvent::Incoming(message)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            log::debug!("[chat] Listener for {target} stopped");
        }));

        log::info!("[chat] Listening on {key}");
        self.subscription = Some(guard);
        self.cancel = Some(cancel_tx);
    }

    /// Applies finished background work; returns how many events were handled.
    pub fn handle_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            match event {
                ChatEvent::Header(header) => self.header = header,
                ChatEvent::History(LoadState::Ready(history)) => {
                    self.merge_history(history);
                    self.history = LoadState::Ready(());
                }
                ChatEvent::History(LoadState::Failed(reason)) => {
                    self.history = LoadState::Failed(reason);
                }
                ChatEvent::History(LoadState::Loading) => {}
                ChatEvent::Incoming(message) => self.receive(message),
                ChatEvent::Sent(message) => {
                    self.sending = false;
                    self.append(message);
                }
                ChatEvent::SendFailed { content } => {
                    self.sending = false;
                    if self.draft.trim().is_empty() {
                        self.draft = content;
                    }
                }
            }
            handled += 1;
        }
        handled
    }

    /// History goes first; anything that arrived live before it resolved
    /// stays after it, minus duplicates.
    fn merge_history(&mut self, history: Vec<ChatMessage>) {
        let live = std::mem::take(&mut self.messages);
        self.seen.clear();
        for message in history.into_iter().chain(live) {
            if self.seen.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.scroll_to_bottom = true;
    }

    fn append(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            log::debug!("[chat] Dropping duplicate message {}", message.id);
            return false;
        }
        self.messages.push(message);
        self.scroll_to_bottom = true;
        true
    }

    fn receive(&mut self, message: ChatMessage) {
        let from_other = Some(&message.sender_id) != self.me.user_id();
        let key = format!("message:{}", message.id);
        if self.append(message) && from_other {
            let text = match self.header.ready() {
                Some(profile) if !profile.first_name().is_empty() => {
                    format!("New message from {}", profile.first_name())
                }
                _ => "New message".to_string(),
            };
            self.ctx.toaster.info_for(key, text);
        }
    }

    /// Sends the trimmed draft. Returns `false` when nothing was sent.
    pub fn send(&mut self) -> bool {
        let content = self.draft.trim().to_string();
        if content.is_empty() || self.sending {
            return false;
        }
        let Some(me) = self.me.user_id().cloned() else {
            self.ctx.toaster.error("Sign in to send messages");
            return false;
        };

        let message = NewMessage {
            sender_id: me,
            receiver_id: self.target.clone(),
            content: content.clone(),
        };
        self.draft.clear();
        self.sending = true;

        // Detached from `tasks`: unmounting never cancels an insert.
        let store = self.ctx.store.clone();
        let tables = self.ctx.tables.clone();
        let toaster = self.ctx.toaster.clone();
        let sender = self.sender.clone();
        self.ctx.runtime.spawn(async move {
            let event = match tables.send_message(store.as_ref(), &message).await {
                Ok(sent) => ChatEvent::Sent(sent),
                Err(err) => {
                    log::error!("[chat] Failed to send message: {err}");
                    toaster.error("Failed to send message");
                    ChatEvent::SendFailed { content }
                }
            };
            let _ = sender.send(event).await;
        });
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn me(&self) -> &IdentityContext {
        &self.me
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }

    /// Header text; a placeholder until the profile arrives.
    pub fn title(&self) -> String {
        match &self.header {
            LoadState::Ready(profile) => profile.display_name(),
            LoadState::Loading => "Loading...".to_string(),
            LoadState::Failed(_) => format!("User {}", self.target),
        }
    }

    /// Returns whether the view should scroll to the newest message, and
    /// resets the request.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_bottom)
    }

    pub fn unmount(&mut self) {
        if let Some(mut guard) = self.subscription.take() {
            guard.release();
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.unmount();
    }
}
