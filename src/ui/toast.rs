use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

const TOAST_BUFFER: usize = 64;
/// How long a toast key keeps suppressing repeats, shown or not.
const KEY_MEMORY: Duration = Duration::from_secs(60);
const KEY_MEMORY_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub level: ToastLevel,
    pub text: String,
    /// Identifies the triggering event; later toasts with the same key are
    /// dropped for a while, even after the first one is gone.
    pub key: Option<String>,
}

/// Fire-and-forget handle used by views and background tasks.
#[derive(Clone)]
pub struct Toaster {
    sender: mpsc::Sender<Toast>,
}

impl Toaster {
    pub fn channel() -> (Self, mpsc::Receiver<Toast>) {
        let (sender, receiver) = mpsc::channel(TOAST_BUFFER);
        (Self { sender }, receiver)
    }

    pub fn info_for(&self, key: impl Into<String>, text: impl Into<String>) {
        self.raise(ToastLevel::Info, text.into(), Some(key.into()));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.raise(ToastLevel::Error, text.into(), None);
    }

    fn raise(&self, level: ToastLevel, text: String, key: Option<String>) {
        if let Err(err) = self.sender.try_send(Toast { level, text, key }) {
            log::warn!("Failed to raise toast: {err}");
        }
    }
}

/// Toasts currently on screen, each dismissed after `duration`.
pub struct ToastBoard {
    receiver: mpsc::Receiver<Toast>,
    visible: Vec<(Toast, Instant)>,
    recent_keys: VecDeque<(String, Instant)>,
    duration: Duration,
}

impl ToastBoard {
    pub fn new(receiver: mpsc::Receiver<Toast>, duration: Duration) -> Self {
        Self {
            receiver,
            visible: Vec::new(),
            recent_keys: VecDeque::new(),
            duration,
        }
    }

    /// Takes in newly raised toasts and drops expired ones.
    pub fn poll(&mut self, now: Instant) {
        let duration = self.duration;
        self.visible
            .retain(|(_, shown_at)| now.saturating_duration_since(*shown_at) < duration);

        while let Some((_, seen_at)) = self.recent_keys.front() {
            if now.saturating_duration_since(*seen_at) < KEY_MEMORY {
                break;
            }
            self.recent_keys.pop_front();
        }

        while let Ok(toast) = self.receiver.try_recv() {
            if let Some(key) = &toast.key {
                if self.recent_keys.iter().any(|(seen, _)| seen == key) {
                    log::debug!("Suppressing duplicate toast {key}");
                    continue;
                }
                if self.recent_keys.len() == KEY_MEMORY_LIMIT {
                    self.recent_keys.pop_front();
                }
                self.recent_keys.push_back((key.clone(), now));
            }
            self.visible.push((toast, now));
        }
    }

    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        self.visible.iter().map(|(toast, _)| toast)
    }

    pub fn dismiss(&mut self, index: usize) {
        if index < self.visible.len() {
            self.visible.remove(index);
        }
    }

    /// Time until the oldest toast expires, for repaint scheduling.
    pub fn next_expiry(&self, now: Instant) -> Option<Duration> {
        self.visible
            .iter()
            .map(|(_, shown_at)| (*shown_at + self.duration).saturating_duration_since(now))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_expire_and_dedupe_by_key() {
        let (toaster, receiver) = Toaster::channel();
        let mut board = ToastBoard::new(receiver, Duration::from_secs(3));
        let start = Instant::now();

        toaster.info_for("message:7", "📩 New message from Bob Ray");
        toaster.info_for("message:7", "New message from Bob");
        toaster.error("Failed to send message");
        board.poll(start);

        let texts: Vec<_> = board.visible().map(|toast| toast.text.as_str()).collect();
        assert_eq!(texts, ["📩 New message from Bob Ray", "Failed to send message"]);
        assert_eq!(board.next_expiry(start), Some(Duration::from_secs(3)));

        board.poll(start + Duration::from_secs(3));
        assert_eq!(board.visible().count(), 0);

        toaster.error("again");
        board.poll(start + Duration::from_secs(4));
        board.dismiss(0);
        assert_eq!(board.visible().count(), 0);
    }

    #[test]
    fn keys_are_remembered_after_dismissal_and_expiry() {
        let (toaster, receiver) = Toaster::channel();
        let mut board = ToastBoard::new(receiver, Duration::from_secs(3));
        let start = Instant::now();

        toaster.info_for("message:1", "New message from Bob");
        board.poll(start);
        board.dismiss(0);
        toaster.info_for("message:1", "📩 New message from Bob Ray");
        board.poll(start + Duration::from_secs(1));
        assert_eq!(board.visible().count(), 0);

        toaster.info_for("message:1", "📩 New message from Bob Ray");
        board.poll(start + Duration::from_secs(10));
        assert_eq!(board.visible().count(), 0);

        toaster.info_for("message:1", "📩 New message from Bob Ray");
        board.poll(start + KEY_MEMORY);
        assert_eq!(board.visible().count(), 1);
    }
}
