use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Draft, Entity, Mutable, Patch};
use crate::validate::{self, ValidationError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseId(String);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct LessonId(String);

impl_id!(CourseId);
impl_id!(LessonId);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub level: Level,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub lesson_count: u32,
    #[serde(default)]
    pub student_count: u32,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default, with = "crate::timestamp::optional")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::timestamp::optional")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct CoursePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

impl Entity for Course {
    type Id = CourseId;

    const COLLECTION: &'static str = "courses";

    fn id(&self) -> &CourseId {
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

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl Mutable for Course {
    type Draft = NewCourse;
    type Patch = CoursePatch;
}

impl Draft for NewCourse {
    const SCHEMA: &'static str = "course";
    const VERSION: u32 = 1;

    fn validate(&self) -> Result<(), ValidationError> {
        validate::require("title", &self.title)?;
        validate::require("category", &self.category)
    }
}

impl Patch for CoursePatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.level.is_none()
            && self.is_published.is_none()
        {
            return Err(ValidationError::EmptyPatch);
        }
        validate::require_if_present("title", self.title.as_ref())?;
        validate::require_if_present("category", self.category.as_ref())
    }
}
