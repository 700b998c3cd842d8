//! In-memory stand-in for the REST API, used by the unit tests.

use async_trait::async_trait;
use tokio::sync::Notify;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{Api, LessonResources, ListQuery, MutationApi, Page, Reactions};
use crate::client::{Error, ErrorBody};
use crate::course::LessonId;
use crate::entity::{Entity, Mutable};
use crate::lock;
use crate::post::{Comment, LikeStatus, NewComment, NewPost, Post, PostId, PostPatch};
use crate::resource::{NewResource, Resource, ResourceId, ResourcePatch, Scope};
use crate::user::{Author, UserId};

pub fn resource(id: &str, category: &str) -> Resource {
    Resource {
        id: ResourceId::from(id),
        title: format!("Resource {}", id),
        description: String::new(),
        category: category.to_string(),
        language: "en".to_string(),
        file_type: "pdf".to_string(),
        file_url: format!("/files/{}.pdf", id),
        scope: Scope::PlatformWide,
        author_id: UserId::from("u1"),
        is_public: true,
        created_at: None,
    }
}

pub fn post(id: &str, body: &str) -> Post {
    Post {
        id: PostId::from(id),
        author: Author {
            id: UserId::from("u1"),
            name: "Naomi".to_string(),
            avatar_url: None,
        },
        body: body.to_string(),
        media: None,
        like_count: 0,
        comment_count: 0,
        share_count: 0,
        liked: false,
        created_at: None,
    }
}

/// How the fake turns drafts and patches into stored entities.
pub trait FakeEntity: Mutable {
    fn from_draft(draft: &Self::Draft, serial: usize) -> Self;

    fn apply(&mut self, patch: &Self::Patch);
}

impl FakeEntity for Resource {
    fn from_draft(draft: &NewResource, serial: usize) -> Self {
        Resource {
            id: ResourceId::from(format!("new-{}", serial)),
            title: draft.title.clone(),
            description: draft.description.clone(),
            category: draft.category.clone(),
            language: draft.language.clone(),
            scope: draft.scope,
            is_public: draft.is_public,
            ..resource("", "")
        }
    }

    fn apply(&mut self, patch: &ResourcePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
    }
}

impl FakeEntity for Post {
    fn from_draft(draft: &NewPost, serial: usize) -> Self {
        Post {
            id: PostId::from(format!("new-{}", serial)),
            media: draft.media.clone(),
            ..post("", &draft.body)
        }
    }

    fn apply(&mut self, patch: &PostPatch) {
        self.body = patch.body.clone();
    }
}

pub struct FakeApi<E> {
    items: Mutex<Vec<E>>,
    failures: Mutex<VecDeque<ErrorBody>>,
    gate: Mutex<Option<Arc<Notify>>>,
    answer_gates: Mutex<VecDeque<Arc<Notify>>>,
    attachments: Mutex<HashMap<LessonId, Vec<ResourceId>>>,
    calls: AtomicUsize,
    serial: AtomicUsize,
}

impl<E: Entity> FakeApi<E> {
    pub fn with_items(items: impl IntoIterator<Item = E>) -> Self {
        FakeApi {
            items: Mutex::new(items.into_iter().collect()),
            failures: Mutex::new(VecDeque::new()),
            gate: Mutex::new(None),
            answer_gates: Mutex::new(VecDeque::new()),
            attachments: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            serial: AtomicUsize::new(0),
        }
    }

    /// Makes the next call fail with a 500 carrying `message`.
    pub fn fail_next(&self, message: &str) {
        self.fail_next_with(500, message);
    }

    pub fn fail_next_with(&self, status_code: u16, message: &str) {
        lock(&self.failures).push_back(ErrorBody {
            id: "fake.failure".to_string(),
            message: message.to_string(),
            request_id: String::new(),
            status_code,
        });
    }

    /// Parks every call until the returned gate is notified or
    /// [`FakeApi::release`] is called for later calls.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn release(&self) {
        *lock(&self.gate) = None;
    }

    /// The next attachment change is applied right away, but its answer is
    /// held until the returned gate is notified.
    pub fn hold_answer(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.answer_gates).push_back(Arc::clone(&gate));
        gate
    }

    async fn answer<T>(&self, value: T) -> T {
        let gate = lock(&self.answer_gates).pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        value
    }

    /// Number of calls that reached the fake.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn items(&self) -> Vec<E> {
        lock(&self.items).clone()
    }

    pub fn edit(&self, id: &E::Id, change: impl FnOnce(&mut E)) {
        if let Some(item) = lock(&self.items).iter_mut().find(|item| item.id() == id) {
            change(item);
        }
    }

    pub fn forget(&self, id: &E::Id) {
        lock(&self.items).retain(|item| item.id() != id);
    }

    pub fn set_attached(&self, lesson: &LessonId, resources: Vec<ResourceId>) {
        lock(&self.attachments).insert(lesson.clone(), resources);
    }

    pub fn attached_on(&self, lesson: &LessonId) -> Vec<ResourceId> {
        lock(&self.attachments).get(lesson).cloned().unwrap_or_default()
    }

    async fn call(&self) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // A failure is claimed on arrival, so one queued while a call is
        // parked goes to the next call.
        let failure = lock(&self.failures).pop_front();
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match failure {
            Some(body) => Err(Error::Response(body)),
            None => Ok(()),
        }
    }

    fn not_found(id: &impl std::fmt::Display) -> Error {
        Error::Response(ErrorBody {
            id: "fake.not_found".to_string(),
            message: format!("{} not found", id),
            request_id: String::new(),
            status_code: 404,
        })
    }
}

#[async_trait]
impl<E: Entity> Api<E> for FakeApi<E> {
    async fn list(&self, query: &ListQuery) -> Result<Page<E>, Error> {
        self.call().await?;
        let search = query.search.as_deref().unwrap_or("").to_lowercase();
        let matching: Vec<E> = lock(&self.items)
            .iter()
            .filter(|item| {
                search.is_empty()
                    || item
                        .search_fields()
                        .iter()
                        .any(|field| field.to_lowercase().contains(&search))
            })
            .filter(|item| match &query.category {
                Some(category) => item
                    .category()
                    .map(|own| own.eq_ignore_ascii_case(category))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();
        let size = query.page_size.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * size;
        Ok(Page {
            total: Some(matching.len() as u64),
            items: matching.into_iter().skip(skip).take(size).collect(),
        })
    }

    async fn get(&self, id: &E::Id) -> Result<E, Error> {
        self.call().await?;
        lock(&self.items)
            .iter()
            .find(|item| item.id() == id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }
}

#[async_trait]
impl<E: FakeEntity> MutationApi<E> for FakeApi<E> {
    async fn create(&self, draft: &E::Draft) -> Result<E, Error> {
        self.call().await?;
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        let entity = E::from_draft(draft, serial);
        lock(&self.items).insert(0, entity.clone());
        Ok(entity)
    }

    async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<E, Error> {
        self.call().await?;
        let mut items = lock(&self.items);
        let item = items
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| Self::not_found(id))?;
        item.apply(patch);
        Ok(item.clone())
    }

    async fn delete(&self, id: &E::Id) -> Result<(), Error> {
        self.call().await?;
        let mut items = lock(&self.items);
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl Reactions for FakeApi<Post> {
    async fn set_like(&self, post: &PostId, liked: bool) -> Result<LikeStatus, Error> {
        self.call().await?;
        let mut items = lock(&self.items);
        let held = items
            .iter_mut()
            .find(|item| &item.id == post)
            .ok_or_else(|| Self::not_found(post))?;
        if held.liked != liked {
            held.set_like_status(held.like_status().toggled());
        }
        Ok(held.like_status())
    }

    async fn comment(&self, post: &PostId, comment: &NewComment) -> Result<Comment, Error> {
        self.call().await?;
        let mut items = lock(&self.items);
        let held = items
            .iter_mut()
            .find(|item| &item.id == post)
            .ok_or_else(|| Self::not_found(post))?;
        held.comment_count += 1;
        Ok(Comment {
            id: format!("c-{}", held.comment_count),
            post_id: post.clone(),
            author: held.author.clone(),
            body: comment.body.clone(),
            created_at: None,
        })
    }
}

#[async_trait]
impl LessonResources for FakeApi<Resource> {
    async fn attached(&self, lesson: &LessonId) -> Result<Vec<ResourceId>, Error> {
        self.call().await?;
        Ok(lock(&self.attachments)
            .get(lesson)
            .cloned()
            .unwrap_or_default())
    }

    async fn attach(
        &self,
        resource: &ResourceId,
        lesson: &LessonId,
    ) -> Result<Vec<ResourceId>, Error> {
        self.call().await?;
        let answer = {
            let mut attachments = lock(&self.attachments);
            let attached = attachments.entry(lesson.clone()).or_default();
            if !attached.contains(resource) {
                attached.push(resource.clone());
            }
            attached.clone()
        };
        Ok(self.answer(answer).await)
    }

    async fn detach(
        &self,
        resource: &ResourceId,
        lesson: &LessonId,
    ) -> Result<Vec<ResourceId>, Error> {
        self.call().await?;
        let answer = {
            let mut attachments = lock(&self.attachments);
            let attached = attachments.entry(lesson.clone()).or_default();
            attached.retain(|held| held != resource);
            attached.clone()
        };
        Ok(self.answer(answer).await)
    }
}
