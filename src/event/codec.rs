//! Wire codec for `detail`.
//!
//! The bus carries `detail` as a JSON-encoded string. Rule targets may also
//! receive it already decoded, so decoding accepts both forms.

use super::Detail;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(detail: &Detail, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let encoded = serde_json::to_string(detail).map_err(S::Error::custom)?;
    serializer.serialize_str(&encoded)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Detail, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDetail {
        Encoded(String),
        Object(Detail),
    }

    match RawDetail::deserialize(deserializer)? {
        RawDetail::Object(detail) => Ok(detail),
        RawDetail::Encoded(s) if s.trim().is_empty() => Ok(Detail::new()),
        RawDetail::Encoded(s) => serde_json::from_str(&s)
            .map_err(|e| D::Error::custom(format!("detail is not a JSON object: {}", e))),
    }
}
