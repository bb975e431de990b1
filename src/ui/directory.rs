use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::UserProfile;

use super::context::ViewContext;
use super::state::LoadState;

enum DirectoryEvent {
    Loaded(LoadState<Vec<UserProfile>>),
}

/// Alumni listing with a live search box. The snapshot is fetched once per
/// mount and never refreshed.
pub struct DirectoryView {
    pub alumni: LoadState<Vec<UserProfile>>,
    pub search: String,
    events: mpsc::Receiver<DirectoryEvent>,
    task: Option<JoinHandle<()>>,
}

impl DirectoryView {
    pub fn mount(ctx: &ViewContext) -> Self {
        let (sender, events) = mpsc::channel(1);
        let store = ctx.store.clone();
        let tables = ctx.tables.clone();

        let task = ctx.runtime.spawn(async move {
            let result = tables.fetch_alumni(store.as_ref()).await;
            match &result {
                Ok(alumni) => log::info!("[directory] Loaded {} alumni", alumni.len()),
                Err(err) => log::warn!("[directory] Failed to load alumni: {err}"),
            }
            let _ = sender
                .send(DirectoryEvent::Loaded(LoadState::from_result(result)))
                .await;
        });

        Self {
            alumni: LoadState::Loading,
            search: String::new(),
            events,
            task: Some(task),
        }
    }

    /// Applies finished background work; returns how many events were handled.
    pub fn handle_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            match event {
                DirectoryEvent::Loaded(state) => self.alumni = state,
            }
            handled += 1;
        }
        handled
    }

    pub fn unmount(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DirectoryView {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Case-insensitive substring match on full name or username.
pub fn filter_alumni<'a>(alumni: &'a [UserProfile], query: &str) -> Vec<&'a UserProfile> {
    let needle = query.to_lowercase();
    alumni
        .iter()
        .filter(|alum| {
            alum.full_name.to_lowercase().contains(&needle)
                || alum
                    .username
                    .as_deref()
                    .is_some_and(|username| username.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::backend::{InMemoryStore, Tables};
    use crate::storage::LocalStorage;
    use crate::ui::toast::Toaster;

    fn profile(id: i64, full_name: &str, username: &str) -> UserProfile {
        UserProfile {
            id: id.into(),
            full_name: full_name.into(),
            username: Some(username.into()),
            graduation_year: None,
            department: None,
        }
    }

    fn context(store: &InMemoryStore) -> ViewContext {
        let (toaster, _receiver) = Toaster::channel();
        ViewContext {
            store: Arc::new(store.clone()),
            tables: Tables::default(),
            local_storage: LocalStorage::in_memory().unwrap(),
            toaster,
            runtime: tokio::runtime::Handle::current(),
        }
    }

    async fn settle(view: &mut DirectoryView) {
        for _ in 0..100 {
            if view.handle_events() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("directory never loaded");
    }

    #[test]
    fn filter_matches_name_or_username_ignoring_case() {
        let alumni = vec![profile(1, "Ann Lee", "al1"), profile(2, "Bob Ray", "br2")];

        let names = |query: &str| -> Vec<String> {
            filter_alumni(&alumni, query)
                .into_iter()
                .map(|alum| alum.full_name.clone())
                .collect()
        };
        assert_eq!(names("an"), ["Ann Lee"]);
        assert_eq!(names("R"), ["Bob Ray"]);
        assert_eq!(names("BR2"), ["Bob Ray"]);
        assert_eq!(names("e"), ["Ann Lee"]);
        assert_eq!(names(""), ["Ann Lee", "Bob Ray"]);
        assert!(names("zzz").is_empty());
    }

    #[test]
    fn missing_username_only_matches_name() {
        let mut alum = profile(3, "Chidi Okafor", "x");
        alum.username = None;
        assert_eq!(filter_alumni(std::slice::from_ref(&alum), "chi").len(), 1);
        assert!(filter_alumni(std::slice::from_ref(&alum), "x").is_empty());
    }

    #[tokio::test]
    async fn loads_snapshot_once() {
        let store = InMemoryStore::demo();
        let mut view = DirectoryView::mount(&context(&store));
        assert!(view.alumni.is_loading());
        settle(&mut view).await;
        assert_eq!(view.alumni.ready().map(Vec::len), Some(4));

        store.seed("users", json!({"id": 9, "full_name": "Late Joiner"}));
        let alumni = view.alumni.ready().unwrap();
        assert!(filter_alumni(alumni, "late").is_empty());
        assert_eq!(filter_alumni(alumni, "ann").len(), 1);
    }

    #[tokio::test]
    async fn failed_load_differs_from_empty() {
        let store = InMemoryStore::new();
        let mut view = DirectoryView::mount(&context(&store));
        settle(&mut view).await;
        assert_eq!(view.alumni, LoadState::Ready(Vec::new()));

        store.set_fail_reads(true);
        let mut view = DirectoryView::mount(&context(&store));
        settle(&mut view).await;
        assert!(view.alumni.is_failed());
    }
}
