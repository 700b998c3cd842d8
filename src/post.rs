use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Draft, Entity, Mutable, Patch};
use crate::user::Author;
use crate::validate::{self, ValidationError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostId(String);

impl_id!(PostId);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author: Author,
    pub body: String,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub share_count: u64,
    /// Whether the viewing user has liked this post.
    #[serde(default)]
    pub liked: bool,
    #[serde(default, with = "crate::timestamp::optional")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewPost {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PostPatch {
    pub body: String,
}

/// Like state as reported by the server after a like/unlike.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeStatus {
    pub liked: bool,
    pub like_count: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewComment {
    pub body: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub post_id: PostId,
    pub author: Author,
    pub body: String,
    #[serde(default, with = "crate::timestamp::optional")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    pub(crate) fn like_status(&self) -> LikeStatus {
        LikeStatus {
            liked: self.liked,
            like_count: self.like_count,
        }
    }

    pub(crate) fn set_like_status(&mut self, status: LikeStatus) {
        self.liked = status.liked;
        self.like_count = status.like_count;
    }
}

impl LikeStatus {
    /// The status after the viewer flips their like.
    pub fn toggled(self) -> LikeStatus {
        if self.liked {
            LikeStatus {
                liked: false,
                like_count: self.like_count.saturating_sub(1),
            }
        } else {
            LikeStatus {
                liked: true,
                like_count: self.like_count.saturating_add(1),
            }
        }
    }
}

impl Entity for Post {
    type Id = PostId;

    const COLLECTION: &'static str = "posts";

    fn id(&self) -> &PostId {
        &self.id
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.body.as_str(), self.author.name.as_str()]
    }

    fn label(&self) -> &str {
        &self.body
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl Mutable for Post {
    type Draft = NewPost;
    type Patch = PostPatch;
}

impl Draft for NewPost {
    const SCHEMA: &'static str = "post";
    const VERSION: u32 = 1;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.media.is_some() {
            return Ok(());
        }
        validate::require("body", &self.body)
    }
}

impl Patch for PostPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::require("body", &self.body)
    }
}

impl NewComment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::require("body", &self.body)
    }
}
