//! Client-side cache of one remote collection view.
//!
//! A [`Store`] is a cheap handle; clones share the same items. Only the
//! store's own load routines and the mutation coordinators change what it
//! holds. Presentation code reads it through [`Store::view`].

use tracing::{debug, warn};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{Api, ListQuery};
use crate::client::Error;
use crate::entity::Entity;
use crate::lock;
use crate::projection::{self, Projection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Replace the held items with the fetched page.
    Replace,
    /// Add the fetched page after the held items.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    Ready,
}

/// What a list view should render.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<E> {
    Loading,
    /// The last request failed. `stale` is the projection of whatever was
    /// held before it, so the view can keep showing it next to a retry.
    Failed { message: String, stale: Vec<E> },
    Empty,
    Populated {
        items: Vec<E>,
        page: usize,
        page_count: usize,
    },
}

struct State<E> {
    items: Vec<E>,
    status: Status,
    error: Option<String>,
    last_load: Option<(ListQuery, LoadMode)>,
    total: Option<u64>,
}

struct Shared<E> {
    state: Mutex<State<E>>,
    mounted: AtomicBool,
    generation: AtomicU64,
}

pub struct Store<E: Entity> {
    shared: Arc<Shared<E>>,
}

impl<E: Entity> Clone for Store<E> {
    fn clone(&self) -> Self {
        Store {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Entity> Default for Store<E> {
    fn default() -> Self {
        Store::new()
    }
}

impl<E: Entity> Store<E> {
    pub fn new() -> Self {
        Store {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: Vec::new(),
                    status: Status::Idle,
                    error: None,
                    last_load: None,
                    total: None,
                }),
                mounted: AtomicBool::new(true),
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<E>> {
        lock(&self.shared.state)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_mounted() && self.shared.generation.load(Ordering::SeqCst) == generation
    }

    /// Fetches a page and replaces or extends the held items.
    ///
    /// On failure the previous items stay in place and the error message is
    /// kept for display. A response that arrives after a newer load started,
    /// or after [`Store::teardown`], is dropped.
    pub async fn load<A>(&self, api: &A, query: ListQuery, mode: LoadMode) -> Result<(), Error>
    where
        A: Api<E> + ?Sized,
    {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state();
            state.status = Status::Loading;
            state.last_load = Some((query.clone(), mode));
        }

        let result = api.list(&query).await;

        if !self.is_current(generation) {
            debug!(
                collection = E::COLLECTION,
                generation, "dropping superseded response"
            );
            return Ok(());
        }

        let mut state = self.state();
        state.status = Status::Ready;
        match result {
            Ok(page) => {
                debug!(
                    collection = E::COLLECTION,
                    page = query.page,
                    count = page.items.len(),
                    "loaded"
                );
                match mode {
                    LoadMode::Replace => state.items = page.items,
                    LoadMode::Append => {
                        for item in page.items {
                            let held = state.items.iter().position(|held| held.id() == item.id());
                            match held {
                                Some(index) => state.items[index] = item,
                                None => state.items.push(item),
                            }
                        }
                    }
                }
                state.total = page.total;
                state.error = None;
                Ok(())
            }
            Err(err) => {
                warn!(collection = E::COLLECTION, error = %err, "load failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Re-issues the last load. Nothing retries on its own.
    pub async fn retry<A>(&self, api: &A) -> Result<(), Error>
    where
        A: Api<E> + ?Sized,
    {
        let last = self.state().last_load.clone();
        match last {
            Some((query, mode)) => self.load(api, query, mode).await,
            None => Ok(()),
        }
    }

    /// Appends the page after the last one loaded.
    pub async fn next_page<A>(&self, api: &A) -> Result<(), Error>
    where
        A: Api<E> + ?Sized,
    {
        let last = self.state().last_load.clone();
        match last {
            Some((query, _)) => self.load(api, query.next_page(), LoadMode::Append).await,
            None => Ok(()),
        }
    }

    /// Re-fetches one entity in place. An entity the server no longer has
    /// is dropped.
    pub async fn refresh<A>(&self, api: &A, id: &E::Id) -> Result<(), Error>
    where
        A: Api<E> + ?Sized,
    {
        match api.get(id).await {
            Ok(entity) => {
                self.replace(entity);
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                self.invalidate(id);
                Ok(())
            }
            Err(err) => {
                if self.is_mounted() {
                    self.state().error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Drops one entity without reloading. Returns whether it was held.
    pub fn invalidate(&self, id: &E::Id) -> bool {
        self.remove(id)
    }

    /// Stops applying results. Call when the view goes away.
    pub fn teardown(&self) {
        self.shared.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.mounted.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Status {
        self.state().status
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.state().error = None;
    }

    pub fn items(&self) -> Vec<E> {
        self.state().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    pub fn get(&self, id: &E::Id) -> Option<E> {
        self.state()
            .items
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.state().items.iter().any(|item| item.id() == id)
    }

    /// Whether the server reported more matches than are held.
    pub fn has_more(&self) -> bool {
        let state = self.state();
        state
            .total
            .map(|total| (state.items.len() as u64) < total)
            .unwrap_or(false)
    }

    pub fn view(&self, projection: &Projection) -> ViewState<E> {
        let state = self.state();
        let projected = projection::project(&state.items, projection);
        if let Some(message) = &state.error {
            return ViewState::Failed {
                message: message.clone(),
                stale: projected.to_owned_items(),
            };
        }
        if state.items.is_empty() && state.status != Status::Ready {
            return ViewState::Loading;
        }
        if projected.items.is_empty() {
            return ViewState::Empty;
        }
        ViewState::Populated {
            items: projected.to_owned_items(),
            page: projected.page,
            page_count: projected.page_count,
        }
    }

    pub(crate) fn prepend(&self, entity: E) -> bool {
        if !self.is_mounted() {
            return false;
        }
        let mut state = self.state();
        let before = state.items.len();
        state.items.retain(|item| item.id() != entity.id());
        let moved = state.items.len() != before;
        state.items.insert(0, entity);
        if !moved {
            if let Some(total) = state.total.as_mut() {
                *total += 1;
            }
        }
        true
    }

    pub(crate) fn replace(&self, entity: E) -> bool {
        if !self.is_mounted() {
            return false;
        }
        let mut state = self.state();
        match state.items.iter_mut().find(|item| item.id() == entity.id()) {
            Some(held) => {
                *held = entity;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&self, id: &E::Id) -> bool {
        if !self.is_mounted() {
            return false;
        }
        let mut state = self.state();
        let before = state.items.len();
        state.items.retain(|item| item.id() != id);
        let removed = state.items.len() != before;
        if removed {
            if let Some(total) = state.total.as_mut() {
                *total = total.saturating_sub(1);
            }
        }
        removed
    }

    /// Runs `change` on the held entity with `id`, if any.
    pub(crate) fn update<F>(&self, id: &E::Id, change: F) -> bool
    where
        F: FnOnce(&mut E),
    {
        if !self.is_mounted() {
            return false;
        }
        let mut state = self.state();
        match state.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                change(item);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use claims::{assert_err, assert_ok};
    use pretty_assertions::assert_eq;

    use std::sync::Arc;

    use super::*;
    use crate::fake::{resource, FakeApi};
    use crate::resource::{Resource, ResourceId};

    fn ids(items: &[Resource]) -> Vec<String> {
        items.iter().map(|item| item.id.to_string()).collect()
    }

    fn query() -> ListQuery {
        ListQuery::new(2)
    }

    #[tokio::test]
    async fn load_replaces_then_appends() {
        let api = FakeApi::with_items((1..=5).map(|n| resource(&format!("r{}", n), "bible")));
        let store = Store::new();
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        assert_eq!(ids(&store.items()), vec!["r1", "r2"]);
        assert!(store.has_more());

        assert_ok!(store.next_page(&api).await);
        assert_eq!(ids(&store.items()), vec!["r1", "r2", "r3", "r4"]);

        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn append_never_duplicates() {
        let api = FakeApi::with_items((1..=3).map(|n| resource(&format!("r{}", n), "bible")));
        let store = Store::new();
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        assert_ok!(store.load(&api, query(), LoadMode::Append).await);
        assert_eq!(ids(&store.items()), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn failed_load_keeps_stale_items() {
        let api = FakeApi::with_items(vec![resource("r1", "bible")]);
        let store = Store::new();
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);

        api.fail_next("service unavailable");
        assert_err!(store.load(&api, query(), LoadMode::Replace).await);
        assert_eq!(store.error().as_deref(), Some("service unavailable"));
        assert_eq!(ids(&store.items()), vec!["r1"]);
        match store.view(&Projection::default()) {
            ViewState::Failed { message, stale } => {
                assert_eq!(message, "service unavailable");
                assert_eq!(ids(&stale), vec!["r1"]);
            }
            other => panic!("unexpected view {:?}", other),
        }

        assert_ok!(store.retry(&api).await);
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn dismissed_error_returns_to_populated() {
        let api = FakeApi::with_items(vec![resource("r1", "bible")]);
        let store = Store::new();
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        api.fail_next("timeout");
        assert_err!(store.load(&api, query(), LoadMode::Replace).await);
        store.dismiss_error();
        assert!(matches!(
            store.view(&Projection::default()),
            ViewState::Populated { .. }
        ));
    }

    #[tokio::test]
    async fn view_states() {
        let store: Store<Resource> = Store::new();
        assert_eq!(store.view(&Projection::default()), ViewState::Loading);

        let api = FakeApi::<Resource>::with_items(Vec::new());
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        assert_eq!(store.view(&Projection::default()), ViewState::Empty);

        let api = FakeApi::with_items(vec![resource("r1", "bible")]);
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        let music = Projection {
            category: Some("music".to_string()),
            ..Default::default()
        };
        assert_eq!(store.view(&music), ViewState::Empty);
        match store.view(&Projection::default()) {
            ViewState::Populated {
                items,
                page,
                page_count,
            } => {
                assert_eq!(ids(&items), vec!["r1"]);
                assert_eq!((page, page_count), (1, 1));
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalidate_unknown_id_is_noop() {
        let api = FakeApi::with_items(vec![resource("r1", "bible")]);
        let store = Store::new();
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        assert!(!store.invalidate(&ResourceId::from("nope")));
        assert_eq!(store.len(), 1);
        assert!(store.invalidate(&ResourceId::from("r1")));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn prepending_a_held_item_keeps_the_total() {
        let api = FakeApi::with_items(vec![resource("r1", "bible"), resource("r2", "bible")]);
        let store = Store::new();
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);
        assert!(!store.has_more());

        assert!(store.prepend(resource("r2", "bible")));
        assert_eq!(ids(&store.items()), vec!["r2", "r1"]);
        assert!(!store.has_more());

        assert!(store.prepend(resource("r3", "bible")));
        assert_eq!(store.len(), 3);
        assert!(!store.has_more());
    }

    #[tokio::test]
    async fn refresh_replaces_or_drops() {
        let api = FakeApi::with_items(vec![resource("r1", "bible"), resource("r2", "bible")]);
        let store = Store::new();
        assert_ok!(store.load(&api, query(), LoadMode::Replace).await);

        api.edit(&ResourceId::from("r1"), |r| r.title = "Renamed".to_string());
        api.forget(&ResourceId::from("r2"));
        assert_ok!(store.refresh(&api, &ResourceId::from("r1")).await);
        assert_ok!(store.refresh(&api, &ResourceId::from("r2")).await);

        assert_eq!(ids(&store.items()), vec!["r1"]);
        assert_eq!(store.items()[0].title, "Renamed");
    }

    #[tokio::test]
    async fn response_after_teardown_is_dropped() {
        let api = Arc::new(FakeApi::with_items(vec![resource("r1", "bible")]));
        let gate = api.hold();
        let store: Store<Resource> = Store::new();

        let load = store.load(api.as_ref(), query(), LoadMode::Replace);
        let unmount = async {
            tokio::task::yield_now().await;
            store.teardown();
            gate.notify_one();
        };
        let (loaded, ()) = futures::join!(load, unmount);

        assert_ok!(loaded);
        assert!(store.is_empty());
        assert!(!store.is_mounted());
    }

    #[tokio::test]
    async fn superseded_response_is_dropped() {
        let api = Arc::new(FakeApi::with_items(vec![
            resource("r1", "bible"),
            resource("r2", "music"),
        ]));
        let gate = api.hold();
        let store: Store<Resource> = Store::new();

        let mut bible = query();
        bible.category = Some("bible".to_string());
        let mut music = query();
        music.category = Some("music".to_string());

        let slow = store.load(api.as_ref(), bible, LoadMode::Replace);
        let fast = async {
            tokio::task::yield_now().await;
            api.release();
            let result = store.load(api.as_ref(), music, LoadMode::Replace).await;
            gate.notify_one();
            result
        };
        let (slow, fast) = futures::join!(slow, fast);

        assert_ok!(slow);
        assert_ok!(fast);
        assert_eq!(ids(&store.items()), vec!["r2"]);
    }
}
