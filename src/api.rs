//! The data-access surface the stores and coordinators depend on.
//!
//! [`crate::Client`] implements these traits over HTTPS. Anything else that
//! can answer them, such as an in-memory fake, can stand in for it.

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::Error;
use crate::course::LessonId;
use crate::entity::{Entity, Mutable};
use crate::post::{Comment, LikeStatus, NewComment, PostId};
use crate::projection::{Projection, SortKey};
use crate::resource::{ResourceId, Scope};
use crate::user::UserParam;

/// Server-side filtering and paging parameters for a collection read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub scope: Option<Scope>,
    pub sort: SortKey,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub owner: Option<UserParam>,
}

/// One page of a collection as returned by the server.
#[derive(Deserialize, Debug, Clone)]
pub struct Page<E> {
    pub items: Vec<E>,
    /// Total number of matching items across all pages, when the server reports it.
    #[serde(default)]
    pub total: Option<u64>,
}

impl ListQuery {
    pub fn new(page_size: u32) -> Self {
        ListQuery {
            search: None,
            category: None,
            scope: None,
            sort: SortKey::default(),
            page: 1,
            page_size,
            owner: None,
        }
    }

    /// The server-side query matching what a projection filters on.
    pub fn matching(projection: &Projection, page_size: u32) -> Self {
        let search = projection.search.trim();
        ListQuery {
            search: if search.is_empty() {
                None
            } else {
                Some(search.to_string())
            },
            category: projection
                .category
                .clone()
                .filter(|category| !category.is_empty() && !category.eq_ignore_ascii_case("all")),
            scope: projection.scope,
            sort: projection.sort,
            ..ListQuery::new(page_size)
        }
    }

    pub fn owned_by(self, owner: UserParam) -> Self {
        ListQuery {
            owner: Some(owner),
            ..self
        }
    }

    pub fn next_page(&self) -> Self {
        ListQuery {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(scope) = self.scope {
            pairs.push(("scope", scope.as_str().to_string()));
        }
        pairs.push(("sort", self.sort.as_str().to_string()));
        pairs.push(("page", self.page.to_string()));
        pairs.push(("page_size", self.page_size.to_string()));
        if let Some(owner) = &self.owner {
            pairs.push(("owner", owner.as_str().to_string()));
        }
        pairs
    }
}

#[async_trait]
pub trait Api<E: Entity>: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Page<E>, Error>;

    async fn get(&self, id: &E::Id) -> Result<E, Error>;
}

#[async_trait]
pub trait MutationApi<E: Mutable>: Api<E> {
    async fn create(&self, draft: &E::Draft) -> Result<E, Error>;

    async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<E, Error>;

    async fn delete(&self, id: &E::Id) -> Result<(), Error>;
}

/// Likes and comments on community posts.
#[async_trait]
pub trait Reactions: Send + Sync {
    async fn set_like(&self, post: &PostId, liked: bool) -> Result<LikeStatus, Error>;

    async fn comment(&self, post: &PostId, comment: &NewComment) -> Result<Comment, Error>;
}

/// The resource/lesson join. Every call answers with the lesson's full,
/// server-side list of attached resources.
#[async_trait]
pub trait LessonResources: Send + Sync {
    async fn attached(&self, lesson: &LessonId) -> Result<Vec<ResourceId>, Error>;

    async fn attach(&self, resource: &ResourceId, lesson: &LessonId)
        -> Result<Vec<ResourceId>, Error>;

    async fn detach(&self, resource: &ResourceId, lesson: &LessonId)
        -> Result<Vec<ResourceId>, Error>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn query_from_projection() {
        let projection = Projection {
            search: "  psalms ".to_string(),
            category: Some("all".to_string()),
            scope: Some(Scope::ChapterWide),
            sort: SortKey::Title,
            page: 4,
            limit: Some(5),
        };
        let query = ListQuery::matching(&projection, 20).owned_by(UserParam::Me);
        assert_eq!(
            query.query_pairs(),
            vec![
                ("search", "psalms".to_string()),
                ("scope", "chapter_wide".to_string()),
                ("sort", "title".to_string()),
                ("page", "1".to_string()),
                ("page_size", "20".to_string()),
                ("owner", "me".to_string()),
            ]
        );
    }

    #[test]
    fn next_page_keeps_filters() {
        let mut query = ListQuery::new(10);
        query.category = Some("bible".to_string());
        let next = query.next_page();
        assert_eq!(next.page, 2);
        assert_eq!(next.category.as_deref(), Some("bible"));
    }

    #[test]
    fn page_total_is_optional() {
        let page: Page<serde_json::Value> = serde_json::from_str(r#"{"items":[1,2]}"#).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, None);
    }
}
