//! Serde helpers writing byte fields as `"__BASE64__" + base64` strings.
//!
//! Used with `#[serde(with = "tagged_base64")]` on any field that exposes its
//! bytes with `AsRef<[u8]>` and can be rebuilt from a slice.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Marker prefixed to every encoded byte string.
pub const PREFIX: &str = "__BASE64__";

pub fn encode(bytes: &[u8]) -> String {
    format!("{}{}", PREFIX, STANDARD.encode(bytes))
}

pub fn decode(s: &str) -> Result<Vec<u8>, String> {
    let body = s
        .strip_prefix(PREFIX)
        .ok_or_else(|| format!("expected a {} string", PREFIX))?;
    STANDARD.decode(body).map_err(|e| e.to_string())
}

pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&encode(value.as_ref()))
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: for<'a> TryFrom<&'a [u8]>,
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = decode(&s).map_err(de::Error::custom)?;
    T::try_from(bytes.as_slice())
        .map_err(|_| de::Error::invalid_length(bytes.len(), &"a fixed-size byte string"))
}

/// Same encoding for optional fields.
pub mod option {
    use super::*;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&encode(v.as_ref())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: for<'a> TryFrom<&'a [u8]>,
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) => {
                let bytes = decode(&s).map_err(de::Error::custom)?;
                T::try_from(bytes.as_slice()).map(Some).map_err(|_| {
                    de::Error::invalid_length(bytes.len(), &"a fixed-size byte string")
                })
            }
        }
    }
}
