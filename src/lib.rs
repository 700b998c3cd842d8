use std::sync::{Mutex, MutexGuard, PoisonError};

macro_rules! impl_id {
    ($ident:ident) => {
        impl $ident {
            pub fn new(id: impl Into<String>) -> Self {
                $ident(id.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<&str> for $ident {
            fn from(id: &str) -> Self {
                $ident(id.to_string())
            }
        }

        impl From<String> for $ident {
            fn from(id: String) -> Self {
                $ident(id)
            }
        }

        impl std::fmt::Display for $ident {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub mod api;
pub mod attachments;
pub mod badge;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod course;
pub mod entity;
pub mod inflight;
pub mod optimistic;
pub mod post;
pub mod prefs;
pub mod projection;
pub mod resource;
pub mod store;
pub mod user;
pub mod validate;

mod timestamp;

#[cfg(test)]
mod fake;

pub use crate::attachments::LessonAttachments;
pub use crate::client::Client;
pub use crate::client::Error;
pub use crate::config::Config;
pub use crate::coordinator::Coordinator;
pub use crate::projection::{Projection, SortKey};
pub use crate::store::{LoadMode, Store, ViewState};

// Short critical sections only; a panic while holding the lock leaves
// plain data behind, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
