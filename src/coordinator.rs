//! Create, edit, delete and react to entities, keeping every registered
//! [`Store`] view in step with the server.

use tracing::{debug, warn};

use std::sync::{Arc, Mutex};

use crate::api::{MutationApi, Reactions};
use crate::client::Error;
use crate::entity::{Draft, Mutable, Patch};
use crate::inflight::{InFlight, InFlightGuard};
use crate::lock;
use crate::optimistic::optimistic;
use crate::post::{Comment, LikeStatus, NewComment, Post, PostId};
use crate::store::Store;

pub struct Coordinator<E: Mutable, A: ?Sized> {
    api: Arc<A>,
    views: Vec<Store<E>>,
    in_flight: InFlight<E::Id>,
    error: Arc<Mutex<Option<String>>>,
}

impl<E: Mutable, A: ?Sized> Clone for Coordinator<E, A> {
    fn clone(&self) -> Self {
        Coordinator {
            api: Arc::clone(&self.api),
            views: self.views.clone(),
            in_flight: self.in_flight.clone(),
            error: Arc::clone(&self.error),
        }
    }
}

impl<E, A> Coordinator<E, A>
where
    E: Mutable,
    A: MutationApi<E> + ?Sized,
{
    pub fn new(api: Arc<A>, store: Store<E>) -> Self {
        Coordinator {
            api,
            views: vec![store],
            in_flight: InFlight::new(),
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Also keep `store` up to date, e.g. the viewer's own items.
    pub fn with_view(mut self, store: Store<E>) -> Self {
        self.views.push(store);
        self
    }

    /// Last mutation error, for an inline dismissable message.
    pub fn error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    pub fn dismiss_error(&self) {
        *lock(&self.error) = None;
    }

    fn fail(&self, err: Error) -> Error {
        warn!(collection = E::COLLECTION, error = %err, "mutation failed");
        *lock(&self.error) = Some(err.to_string());
        err
    }

    fn claim(&self, id: &E::Id) -> Result<InFlightGuard<E::Id>, Error> {
        self.in_flight
            .begin(id.clone())
            .ok_or_else(|| Error::InFlight(id.to_string()))
    }

    /// Whether any view holds `id`.
    pub fn holds(&self, id: &E::Id) -> bool {
        self.views.iter().any(|view| view.contains(id))
    }

    pub(crate) fn find(&self, id: &E::Id) -> Option<E> {
        self.views.iter().find_map(|view| view.get(id))
    }

    pub(crate) fn update_views<F>(&self, id: &E::Id, change: F)
    where
        F: Fn(&mut E),
    {
        for view in &self.views {
            view.update(id, &change);
        }
    }

    /// Validates and sends `draft`, then puts the created entity at the top
    /// of every view. Invalid drafts never reach the network.
    pub async fn create(&self, draft: E::Draft) -> Result<E, Error> {
        if let Err(invalid) = draft.validate() {
            return Err(self.fail(invalid.into()));
        }
        let created = self.api.create(&draft).await.map_err(|err| self.fail(err))?;
        debug!(collection = E::COLLECTION, id = %created.id(), "created");
        for view in &self.views {
            view.prepend(created.clone());
        }
        Ok(created)
    }

    pub async fn update(&self, id: &E::Id, patch: E::Patch) -> Result<E, Error> {
        if let Err(invalid) = patch.validate() {
            return Err(self.fail(invalid.into()));
        }
        let _guard = self.claim(id).map_err(|err| self.fail(err))?;
        let updated = self
            .api
            .update(id, &patch)
            .await
            .map_err(|err| self.fail(err))?;
        for view in &self.views {
            view.replace(updated.clone());
        }
        Ok(updated)
    }

    /// Deletes `id` on the server, then drops it from every view.
    ///
    /// Nothing is removed before the server confirms. An id no view holds
    /// is left alone.
    pub async fn delete(&self, id: &E::Id) -> Result<(), Error> {
        if !self.holds(id) {
            debug!(collection = E::COLLECTION, %id, "delete of unknown id ignored");
            return Ok(());
        }
        let _guard = self.claim(id).map_err(|err| self.fail(err))?;
        self.api.delete(id).await.map_err(|err| self.fail(err))?;
        for view in &self.views {
            view.invalidate(id);
        }
        Ok(())
    }
}

impl<A> Coordinator<Post, A>
where
    A: MutationApi<Post> + Reactions + ?Sized,
{
    /// Flips the viewer's like immediately and settles on what the server
    /// reports. A rejected request restores the previous flag and count.
    pub async fn toggle_like(&self, id: &PostId) -> Result<LikeStatus, Error> {
        let _guard = self.claim(id).map_err(|err| self.fail(err))?;
        let prior = match self.find(id) {
            Some(post) => post.like_status(),
            None => return Err(self.fail(Error::NotLoaded(id.to_string()))),
        };
        let next = prior.toggled();

        let status = optimistic(
            || self.update_views(id, |post| post.set_like_status(next)),
            self.api.set_like(id, next.liked),
            || self.update_views(id, |post| post.set_like_status(prior)),
        )
        .await
        .map_err(|err| self.fail(err))?;

        self.update_views(id, |post| post.set_like_status(status));
        Ok(status)
    }

    /// Adds a comment, counting it before the server answers.
    pub async fn comment(&self, id: &PostId, body: impl Into<String>) -> Result<Comment, Error> {
        let comment = NewComment { body: body.into() };
        if let Err(invalid) = comment.validate() {
            return Err(self.fail(invalid.into()));
        }
        let prior = match self.find(id) {
            Some(post) => post.comment_count,
            None => return Err(self.fail(Error::NotLoaded(id.to_string()))),
        };

        optimistic(
            || self.update_views(id, |post| post.comment_count = prior.saturating_add(1)),
            self.api.comment(id, &comment),
            || self.update_views(id, |post| post.comment_count = prior),
        )
        .await
        .map_err(|err| self.fail(err))
    }
}
