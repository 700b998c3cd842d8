//! Traits shared by every collection the client caches.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use std::fmt;
use std::hash::Hash;

use crate::resource::Scope;
use crate::validate::ValidationError;

/// Largest file accepted for upload, 100 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// A record fetched from one of the API's collections.
///
/// The accessors with default bodies feed the projection; an entity that has
/// no category, scope or points simply never matches a filter on them and
/// sorts as equal under the corresponding key.
pub trait Entity: Clone + fmt::Debug + DeserializeOwned + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Collection path relative to the API root, e.g. `resources`.
    const COLLECTION: &'static str;

    fn id(&self) -> &Self::Id;

    /// Text matched by free-text search.
    fn search_fields(&self) -> Vec<&str>;

    /// Title or name, used by the `title`/`name` sort keys.
    fn label(&self) -> &str;

    fn category(&self) -> Option<&str> {
        None
    }

    fn scope(&self) -> Option<Scope> {
        None
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn points(&self) -> Option<u32> {
        None
    }
}

/// An entity the client may create, edit and delete.
pub trait Mutable: Entity {
    type Draft: Draft;
    type Patch: Patch;
}

/// Payload for creating an entity. Drafts are sent inside a schema envelope.
pub trait Draft: Serialize + fmt::Debug + Send + Sync {
    const SCHEMA: &'static str;
    const VERSION: u32;

    fn validate(&self) -> Result<(), ValidationError>;

    /// File to send alongside the payload.
    fn upload(&self) -> Option<&Upload> {
        None
    }
}

pub trait Patch: Serialize + fmt::Debug + Send + Sync {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Tagged record wrapping a draft on the wire:
/// `{"schema": "resource", "version": 1, ...fields}`.
#[derive(Serialize, Debug)]
pub struct Envelope<'a, D> {
    schema: &'static str,
    version: u32,
    #[serde(flatten)]
    payload: &'a D,
}

impl<'a, D: Draft> Envelope<'a, D> {
    pub fn of(payload: &'a D) -> Self {
        Envelope {
            schema: D::SCHEMA,
            version: D::VERSION,
            payload,
        }
    }
}

/// File content attached to a draft.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Upload {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn validate(upload: Option<&Upload>) -> Result<(), ValidationError> {
        let upload = upload.ok_or(ValidationError::Missing("file"))?;
        if upload.is_empty() {
            return Err(ValidationError::Missing("file"));
        }
        if upload.len() > MAX_UPLOAD_BYTES {
            return Err(ValidationError::TooLarge {
                field: "file",
                size: upload.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }
        Ok(())
    }
}

// File contents are left out so drafts can be logged.
impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
