use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl_id!(UserId);

/// Whose items to list: the authenticated viewer, or a specific user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum UserParam {
    Me,
    Id(UserId),
}

/// Author summary embedded in posts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl UserParam {
    pub fn as_str(&self) -> &str {
        match self {
            UserParam::Me => "me",
            UserParam::Id(id) => id.as_str(),
        }
    }
}
