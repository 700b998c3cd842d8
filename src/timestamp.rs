//! Serde helpers for the API's timestamp fields.
//!
//! Timestamps come back as RFC 3339 strings, but unset ones are sent as
//! `null`, an empty string, or omitted entirely. All three map to `None`.

pub mod optional {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Parsed(DateTime<Utc>),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawTimestamp>::deserialize(deserializer)? {
            Some(RawTimestamp::Parsed(at)) => Ok(Some(at)),
            Some(RawTimestamp::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(RawTimestamp::Text(text)) => Err(serde::de::Error::custom(format!(
                "invalid timestamp `{}`",
                text
            ))),
            None => Ok(None),
        }
    }

    pub fn serialize<S>(at: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match at {
            Some(at) => serializer.serialize_str(&at.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }
}
