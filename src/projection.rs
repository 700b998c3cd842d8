//! Filtering, sorting and client-side paging of a held collection.
//!
//! Everything here is pure: the same items and the same [`Projection`]
//! always produce the same ordered output. Sorting is stable, so ties keep
//! the order the items were fetched in.

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::entity::Entity;
use crate::resource::Scope;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    Title,
    Name,
    Points,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSortKey(pub String);

impl fmt::Display for UnknownSortKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unknown sort key `{}`, expected one of newest, oldest, title, name, points",
            self.0
        )
    }
}

impl std::error::Error for UnknownSortKey {}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Newest => "newest",
            SortKey::Oldest => "oldest",
            SortKey::Title => "title",
            SortKey::Name => "name",
            SortKey::Points => "points",
        }
    }

    fn compare<E: Entity>(&self, a: &E, b: &E) -> Ordering {
        match self {
            SortKey::Newest => timestamp_millis(b).cmp(&timestamp_millis(a)),
            SortKey::Oldest => timestamp_millis(a).cmp(&timestamp_millis(b)),
            SortKey::Title | SortKey::Name => cmp_ignore_case(a.label(), b.label()),
            SortKey::Points => b.points().unwrap_or(0).cmp(&a.points().unwrap_or(0)),
        }
    }
}

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(SortKey::Newest),
            "oldest" => Ok(SortKey::Oldest),
            "title" => Ok(SortKey::Title),
            "name" => Ok(SortKey::Name),
            "points" => Ok(SortKey::Points),
            _ => Err(UnknownSortKey(s.to_string())),
        }
    }
}

/// What the user asked to see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    /// Case-insensitive substring matched against the entity's search fields.
    pub search: String,
    /// Category to keep. `None`, an empty string and `"all"` keep everything.
    pub category: Option<String>,
    pub scope: Option<Scope>,
    pub sort: SortKey,
    /// 1-based page number. `0` is treated as the first page.
    pub page: usize,
    /// Items per page. `None` returns every match.
    pub limit: Option<usize>,
}

/// One page of a projection, with what pagination controls need.
#[derive(Debug, PartialEq)]
pub struct Projected<'a, E> {
    pub items: Vec<&'a E>,
    pub total_matches: usize,
    pub page: usize,
    pub page_count: usize,
}

impl<'a, E: Clone> Projected<'a, E> {
    pub fn to_owned_items(&self) -> Vec<E> {
        self.items.iter().map(|item| (*item).clone()).collect()
    }
}

/// Number of pages needed for `total` items, never less than one.
pub fn page_count(total: usize, limit: Option<usize>) -> usize {
    match limit {
        Some(limit) if limit > 0 => total.div_ceil(limit).max(1),
        _ => 1,
    }
}

pub fn project<'a, E: Entity>(items: &'a [E], projection: &Projection) -> Projected<'a, E> {
    let term = projection.search.trim().to_lowercase();
    let category = projection
        .category
        .as_deref()
        .map(str::trim)
        .filter(|category| !category.is_empty() && !category.eq_ignore_ascii_case("all"))
        .map(str::to_lowercase);

    let mut matches: Vec<&E> = items
        .iter()
        .filter(|item| matches_search(*item, &term))
        .filter(|item| matches_category(*item, category.as_deref()))
        .filter(|item| match projection.scope {
            Some(scope) => item.scope() == Some(scope),
            None => true,
        })
        .collect();

    // `sort_by` is stable; equal items keep fetch order.
    matches.sort_by(|a, b| projection.sort.compare(*a, *b));

    let total_matches = matches.len();
    let page = projection.page.max(1);
    let page_count = page_count(total_matches, projection.limit);
    let items = match projection.limit {
        Some(limit) if limit > 0 => matches
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect(),
        _ => matches,
    };

    Projected {
        items,
        total_matches,
        page,
        page_count,
    }
}

fn matches_search<E: Entity>(item: &E, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    item.search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(term))
}

fn matches_category<E: Entity>(item: &E, category: Option<&str>) -> bool {
    match category {
        Some(category) => item
            .category()
            .map(|own| own.trim().to_lowercase() == category)
            .unwrap_or(false),
        None => true,
    }
}

// Missing timestamps sort as the epoch.
fn timestamp_millis<E: Entity>(item: &E) -> i64 {
    item.created_at()
        .map(|at| at.timestamp_millis())
        .unwrap_or(0)
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}
