use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct BadgeId(String);

impl_id!(BadgeId);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// An achievement. Badges are awarded elsewhere; the client only reads them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Badge {
    pub id: BadgeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub points: u32,
    pub rarity: Rarity,
    #[serde(default, with = "crate::timestamp::optional")]
    pub earned_at: Option<DateTime<Utc>>,
}

impl Badge {
    pub fn is_earned(&self) -> bool {
        self.earned_at.is_some()
    }
}

impl Entity for Badge {
    type Id = BadgeId;

    const COLLECTION: &'static str = "badges";

    fn id(&self) -> &BadgeId {
        &self.id
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.description.as_str()]
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        Some(&self.category)
    }

    // Unearned badges sort as oldest.
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.earned_at
    }

    fn points(&self) -> Option<u32> {
        Some(self.points)
    }
}
