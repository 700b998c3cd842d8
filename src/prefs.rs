//! Locally persisted viewer preferences: the display locale and the last
//! filters used on each list view.
//!
//! [`PrefsStore::init`] reads the file once; every setter writes it back,
//! but only when the value actually changed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::client::Error;
use crate::projection::{Projection, SortKey};
use crate::resource::Scope;
use crate::validate::ValidationError;

/// A BCP 47 style language tag such as `en` or `pt-BR`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct Locale(String);

impl Locale {
    pub fn parse(tag: &str) -> Result<Locale, ValidationError> {
        let tag = tag.trim();
        let invalid = |reason: &str| ValidationError::Invalid {
            field: "locale",
            reason: format!("`{}` {}", tag, reason),
        };
        let mut subtags = tag.split(|c| c == '-' || c == '_');
        let language = subtags.next().unwrap_or("");
        if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("must start with a 2 or 3 letter language code"));
        }
        let mut normalized = language.to_ascii_lowercase();
        for subtag in subtags {
            if !(2..=8).contains(&subtag.len()) || !subtag.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(invalid("has a malformed subtag"));
            }
            normalized.push('-');
            // Region subtags are upper case by convention.
            if subtag.len() == 2 {
                normalized.push_str(&subtag.to_ascii_uppercase());
            } else {
                normalized.push_str(subtag);
            }
        }
        Ok(Locale(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale("en".to_string())
    }
}

impl TryFrom<String> for Locale {
    type Error = ValidationError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        Locale::parse(&tag)
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> String {
        locale.0
    }
}

/// Filters remembered for one list view.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SavedFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub sort: SortKey,
}

impl SavedFilter {
    pub fn projection(&self, page: usize, limit: Option<usize>) -> Projection {
        Projection {
            search: self.search.clone(),
            category: self.category.clone(),
            scope: self.scope,
            sort: self.sort,
            page,
            limit,
        }
    }
}

impl From<&Projection> for SavedFilter {
    fn from(projection: &Projection) -> Self {
        SavedFilter {
            search: projection.search.clone(),
            category: projection.category.clone(),
            scope: projection.scope,
            sort: projection.sort,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Preferences {
    #[serde(default)]
    pub locale: Locale,
    /// Keyed by view name, e.g. `resources` or `resources.mine`.
    #[serde(default)]
    pub filters: BTreeMap<String, SavedFilter>,
}

pub struct PrefsStore {
    path: Option<PathBuf>,
    prefs: Preferences,
}

impl PrefsStore {
    /// Reads preferences from `path`. A missing file gives the defaults;
    /// `None` keeps everything in memory.
    pub fn init(path: Option<PathBuf>) -> Result<Self, Error> {
        let prefs = match &path {
            Some(path) => read(path)?,
            None => Preferences::default(),
        };
        Ok(PrefsStore { path, prefs })
    }

    pub fn in_memory() -> Self {
        PrefsStore {
            path: None,
            prefs: Preferences::default(),
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn locale(&self) -> &Locale {
        &self.prefs.locale
    }

    pub fn filter(&self, view: &str) -> Option<&SavedFilter> {
        self.prefs.filters.get(view)
    }

    /// Remembers `filter` for `view`. Returns whether anything changed.
    pub fn set_filter(&mut self, view: &str, filter: SavedFilter) -> Result<bool, Error> {
        if self.prefs.filters.get(view) == Some(&filter) {
            return Ok(false);
        }
        self.prefs.filters.insert(view.to_string(), filter);
        self.flush()?;
        Ok(true)
    }

    pub fn set_locale(&mut self, locale: Locale) -> Result<bool, Error> {
        if self.prefs.locale == locale {
            return Ok(false);
        }
        self.prefs.locale = locale;
        self.flush()?;
        Ok(true)
    }

    fn flush(&self) -> Result<(), Error> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves half a file.
        let partial = path.with_extension("json.partial");
        fs::write(&partial, serde_json::to_vec_pretty(&self.prefs)?)?;
        fs::rename(&partial, path)?;
        debug!(path = %path.display(), "preferences saved");
        Ok(())
    }
}

fn read(path: &Path) -> Result<Preferences, Error> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Preferences::default()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use claims::{assert_err, assert_ok};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn locale_tags() {
        assert_eq!(assert_ok!(Locale::parse("pt_br")).as_str(), "pt-BR");
        assert_eq!(assert_ok!(Locale::parse("EN")).as_str(), "en");
        assert_eq!(assert_ok!(Locale::parse("zh-Hant")).as_str(), "zh-Hant");
        assert_err!(Locale::parse(""));
        assert_err!(Locale::parse("english"));
        assert_err!(Locale::parse("en-"));
    }

    #[test]
    fn bad_locale_in_file_is_rejected() {
        assert!(serde_json::from_str::<Preferences>(r#"{"locale":"1"}"#).is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = assert_ok!(PrefsStore::init(Some(dir.path().join("prefs.json"))));
        assert_eq!(store.preferences(), &Preferences::default());
        assert_eq!(store.locale().as_str(), "en");
    }

    #[test]
    fn changes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let filter = SavedFilter {
            search: "psalms".to_string(),
            category: Some("bible".to_string()),
            scope: None,
            sort: SortKey::Title,
        };

        let mut store = assert_ok!(PrefsStore::init(Some(path.clone())));
        assert!(assert_ok!(store.set_filter("resources", filter.clone())));
        assert!(assert_ok!(store.set_locale(Locale::parse("fr").unwrap())));

        let reopened = assert_ok!(PrefsStore::init(Some(path)));
        assert_eq!(reopened.filter("resources"), Some(&filter));
        assert_eq!(reopened.locale().as_str(), "fr");
    }

    #[test]
    fn unchanged_values_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let mut store = assert_ok!(PrefsStore::init(Some(path.clone())));

        assert!(!assert_ok!(store.set_locale(Locale::default())));
        assert!(!path.exists());

        assert!(assert_ok!(store.set_filter("posts", SavedFilter::default())));
        assert!(!assert_ok!(store.set_filter("posts", SavedFilter::default())));
    }

    #[test]
    fn saved_filter_round_trips_through_projection() {
        let filter = SavedFilter {
            search: "hymn".to_string(),
            category: None,
            scope: Some(Scope::ChapterWide),
            sort: SortKey::Oldest,
        };
        let projection = filter.projection(2, Some(10));
        assert_eq!(projection.page, 2);
        assert_eq!(SavedFilter::from(&projection), filter);
    }

    #[test]
    fn in_memory_never_touches_disk() {
        let mut store = PrefsStore::in_memory();
        assert!(assert_ok!(store.set_filter("badges", SavedFilter::default())));
    }
}
