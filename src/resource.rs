use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::str::FromStr;

use crate::entity::{Draft, Entity, Mutable, Patch, Upload};
use crate::user::UserId;
use crate::validate::{self, ValidationError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl_id!(ResourceId);

/// Visibility tier of a resource.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    PlatformWide,
    ChapterWide,
    CourseSpecific,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::PlatformWide => "platform_wide",
            Scope::ChapterWide => "chapter_wide",
            Scope::CourseSpecific => "course_specific",
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "platform_wide" | "platform" => Ok(Scope::PlatformWide),
            "chapter_wide" | "chapter" => Ok(Scope::ChapterWide),
            "course_specific" | "course" => Ok(Scope::CourseSpecific),
            _ => Err(format!(
                "unknown scope `{}`, expected platform_wide, chapter_wide or course_specific",
                s
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_url: String,
    pub scope: Scope,
    pub author_id: UserId,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, with = "crate::timestamp::optional")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Upload form for a new resource.
#[derive(Serialize, Debug, Clone)]
pub struct NewResource {
    pub title: String,
    pub description: String,
    pub category: String,
    pub language: String,
    pub scope: Scope,
    pub is_public: bool,
    #[serde(skip)]
    pub file: Option<Upload>,
}

/// Edit form. Only title, description and category are editable.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ResourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Entity for Resource {
    type Id = ResourceId;

    const COLLECTION: &'static str = "resources";

    fn id(&self) -> &ResourceId {
        &self.id
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.description.as_str()]
    }

    fn label(&self) -> &str {
        &self.title
    }

    fn category(&self) -> Option<&str> {
        Some(&self.category)
    }

    fn scope(&self) -> Option<Scope> {
        Some(self.scope)
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl Mutable for Resource {
    type Draft = NewResource;
    type Patch = ResourcePatch;
}

impl Draft for NewResource {
    const SCHEMA: &'static str = "resource";
    const VERSION: u32 = 1;

    fn validate(&self) -> Result<(), ValidationError> {
        validate::require("title", &self.title)?;
        validate::require("category", &self.category)?;
        Upload::validate(self.file.as_ref())
    }

    fn upload(&self) -> Option<&Upload> {
        self.file.as_ref()
    }
}

impl Patch for ResourcePatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_none() && self.description.is_none() && self.category.is_none() {
            return Err(ValidationError::EmptyPatch);
        }
        validate::require_if_present("title", self.title.as_ref())?;
        validate::require_if_present("category", self.category.as_ref())
    }
}
