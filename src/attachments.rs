//! Which resources are attached to a lesson.
//!
//! The attached set is whatever the server last reported. Attach and detach
//! change it optimistically while the request is out, then replace it with
//! the list the server answers with.

use tracing::{debug, warn};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{LessonResources, MutationApi};
use crate::client::Error;
use crate::coordinator::Coordinator;
use crate::course::LessonId;
use crate::inflight::{InFlight, InFlightGuard};
use crate::lock;
use crate::optimistic::optimistic;
use crate::resource::{NewResource, Resource, ResourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Attached,
    Detached,
    /// A request for this resource is out; the flag shows the expected outcome.
    Pending { attached: bool },
}

#[derive(Default)]
struct State {
    attached: HashSet<ResourceId>,
    pending: HashSet<ResourceId>,
    error: Option<String>,
    /// Sequence handed to the next request.
    issued: u64,
    /// Sequence of the newest server list applied to `attached`.
    applied: u64,
}

impl State {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Takes membership from a server list issued at `seq`.
    ///
    /// `settled` always follows the list. Other resources follow it only when
    /// no newer list has been applied, and resources with a request still
    /// out keep their optimistic mark.
    fn apply(&mut self, list: Vec<ResourceId>, seq: u64, settled: Option<&ResourceId>) {
        let list: HashSet<ResourceId> = list.into_iter().collect();
        if let Some(resource) = settled {
            self.pending.remove(resource);
            if list.contains(resource) {
                self.attached.insert(resource.clone());
            } else {
                self.attached.remove(resource);
            }
        }
        if seq <= self.applied {
            return;
        }
        self.applied = seq;
        let marks: Vec<(ResourceId, bool)> = self
            .pending
            .iter()
            .map(|resource| (resource.clone(), self.attached.contains(resource)))
            .collect();
        self.attached = list;
        for (resource, attached) in marks {
            if attached {
                self.attached.insert(resource);
            } else {
                self.attached.remove(&resource);
            }
        }
    }
}

pub struct LessonAttachments<A: ?Sized> {
    api: Arc<A>,
    lesson: LessonId,
    state: Arc<Mutex<State>>,
    in_flight: InFlight<(ResourceId, LessonId)>,
    mounted: Arc<AtomicBool>,
}

impl<A: ?Sized> Clone for LessonAttachments<A> {
    fn clone(&self) -> Self {
        LessonAttachments {
            api: Arc::clone(&self.api),
            lesson: self.lesson.clone(),
            state: Arc::clone(&self.state),
            in_flight: self.in_flight.clone(),
            mounted: Arc::clone(&self.mounted),
        }
    }
}

impl<A> LessonAttachments<A>
where
    A: LessonResources + ?Sized,
{
    pub fn new(api: Arc<A>, lesson: LessonId) -> Self {
        LessonAttachments {
            api,
            lesson,
            state: Arc::new(Mutex::new(State::default())),
            in_flight: InFlight::new(),
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn lesson(&self) -> &LessonId {
        &self.lesson
    }

    /// Fetches the server's list of attached resources.
    pub async fn load(&self) -> Result<(), Error> {
        let seq = self.state().issue();
        let result = self.api.attached(&self.lesson).await;
        if !self.is_mounted() {
            return Ok(());
        }
        let mut state = self.state();
        match result {
            Ok(attached) => {
                state.apply(attached, seq, None);
                state.error = None;
                Ok(())
            }
            Err(err) => {
                warn!(lesson = %self.lesson, error = %err, "loading attachments failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn is_attached(&self, resource: &ResourceId) -> bool {
        self.state().attached.contains(resource)
    }

    pub fn state_of(&self, resource: &ResourceId) -> Attachment {
        let state = self.state();
        let attached = state.attached.contains(resource);
        if state.pending.contains(resource) {
            Attachment::Pending { attached }
        } else if attached {
            Attachment::Attached
        } else {
            Attachment::Detached
        }
    }

    pub fn attached(&self) -> HashSet<ResourceId> {
        self.state().attached.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.state().error = None;
    }

    pub fn teardown(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn claim(&self, resource: &ResourceId) -> Result<InFlightGuard<(ResourceId, LessonId)>, Error> {
        self.in_flight
            .begin((resource.clone(), self.lesson.clone()))
            .ok_or_else(|| Error::InFlight(format!("{} on lesson {}", resource, self.lesson)))
    }

    fn mark(&self, resource: &ResourceId, attached: bool, pending: bool) {
        if !self.is_mounted() {
            return;
        }
        let mut state = self.state();
        if attached {
            state.attached.insert(resource.clone());
        } else {
            state.attached.remove(resource);
        }
        if pending {
            state.pending.insert(resource.clone());
        } else {
            state.pending.remove(resource);
        }
    }

    fn settle(
        &self,
        resource: &ResourceId,
        seq: u64,
        result: Result<Vec<ResourceId>, Error>,
    ) -> Result<(), Error> {
        match result {
            Ok(attached) => {
                if self.is_mounted() {
                    self.state().apply(attached, seq, Some(resource));
                }
                Ok(())
            }
            Err(err) => {
                warn!(lesson = %self.lesson, %resource, error = %err, "attachment change failed");
                if self.is_mounted() {
                    self.state().error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    pub async fn attach(&self, resource: &ResourceId) -> Result<(), Error> {
        self.change(resource, true).await
    }

    pub async fn detach(&self, resource: &ResourceId) -> Result<(), Error> {
        self.change(resource, false).await
    }

    async fn change(&self, resource: &ResourceId, attach: bool) -> Result<(), Error> {
        let _guard = self.claim(resource)?;
        if self.is_attached(resource) == attach {
            debug!(lesson = %self.lesson, %resource, attach, "already in requested state");
            return Ok(());
        }

        let seq = self.state().issue();
        let call = async {
            if attach {
                self.api.attach(resource, &self.lesson).await
            } else {
                self.api.detach(resource, &self.lesson).await
            }
        };
        let result = optimistic(
            || self.mark(resource, attach, true),
            call,
            || self.mark(resource, !attach, false),
        )
        .await;
        self.settle(resource, seq, result)
    }
}

/// Result of uploading a resource straight into a lesson.
#[derive(Debug)]
pub struct UploadOutcome {
    pub resource: Resource,
    /// Set when the upload went through but attaching it did not. The
    /// resource is kept; the caller may retry the attach.
    pub attach_error: Option<String>,
}

/// Creates a resource, then attaches it to the lesson.
///
/// A failed attach is logged and reported in the outcome; the created
/// resource is not rolled back.
pub async fn upload_and_attach<M, L>(
    resources: &Coordinator<Resource, M>,
    attachments: &LessonAttachments<L>,
    draft: NewResource,
) -> Result<UploadOutcome, Error>
where
    M: MutationApi<Resource> + ?Sized,
    L: LessonResources + ?Sized,
{
    let resource = resources.create(draft).await?;
    let attach_error = match attachments.attach(&resource.id).await {
        Ok(()) => None,
        Err(err) => {
            warn!(
                resource = %resource.id,
                lesson = %attachments.lesson(),
                error = %err,
                "resource uploaded but not attached"
            );
            Some(err.to_string())
        }
    };
    Ok(UploadOutcome {
        resource,
        attach_error,
    })
}
