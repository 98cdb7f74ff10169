//! Message record and JSON codec
//!
//! Requests and replies share one flat record. Every field is always present
//! on the Rust side (defaulting to empty) even when the wire object omits it.

use serde::de::{self, Deserializer, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::{Status, is_final_code};
use crate::error::Result;

/// Reply payload: a single string or an ordered list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Data {
    /// Free text such as a percentage (`"42%"`), or empty when unused
    Text(String),
    /// Ordered entries, e.g. a directory listing
    Entries(Vec<String>),
}

impl Default for Data {
    fn default() -> Self {
        Data::Text(String::new())
    }
}

impl Data {
    /// Whether the payload carries nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Data::Text(text) => text.is_empty(),
            Data::Entries(entries) => entries.is_empty(),
        }
    }

    /// The text payload, if this is [`Data::Text`]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Data::Text(text) => Some(text),
            Data::Entries(_) => None,
        }
    }

    /// The entry list, if this is [`Data::Entries`]
    pub fn as_entries(&self) -> Option<&[String]> {
        match self {
            Data::Text(_) => None,
            Data::Entries(entries) => Some(entries),
        }
    }
}

impl From<String> for Data {
    fn from(text: String) -> Self {
        Data::Text(text)
    }
}

impl From<&str> for Data {
    fn from(text: &str) -> Self {
        Data::Text(text.to_string())
    }
}

impl From<Vec<String>> for Data {
    fn from(entries: Vec<String>) -> Self {
        Data::Entries(entries)
    }
}

/// One protocol message, request or reply
///
/// Request fields are `method`, `path` and `protocol`; reply fields are
/// `protocol`, `code`, `phrase` and `data`. A message with a non-empty `code`
/// is a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Requested operation name (case-insensitive)
    pub method: String,
    /// Filesystem path argument of the request
    pub path: String,
    /// Protocol version identifier, e.g. `"RU/0.4"`
    pub protocol: String,
    /// Status code as a decimal string
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    /// Human-readable status text
    pub phrase: String,
    /// Reply payload
    pub data: Data,
}

impl Message {
    /// Build a request
    pub fn request(
        method: impl Into<String>,
        path: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    /// Build a reply
    pub fn reply(protocol: impl Into<String>, status: &Status, data: impl Into<Data>) -> Self {
        Self {
            protocol: protocol.into(),
            code: status.code_string(),
            phrase: status.phrase.to_string(),
            data: data.into(),
            ..Default::default()
        }
    }

    /// Serialize to the UTF-8 JSON payload of a frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a frame payload
    ///
    /// Absent keys keep their empty defaults. Malformed JSON or invalid UTF-8
    /// is an [`Error::Serialization`](crate::Error::Serialization).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Whether this message is a reply (carries a status code)
    pub fn is_reply(&self) -> bool {
        !self.code.is_empty()
    }

    /// The status code as a number, if it parses
    pub fn status_code(&self) -> Option<u16> {
        self.code.trim().parse().ok()
    }

    /// Whether this reply ends the reply sequence of its request
    ///
    /// `202` and `206` are interim; any other code (including one that does
    /// not parse) is final.
    pub fn is_final(&self) -> bool {
        self.status_code().is_none_or(is_final_code)
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        if !self.method.is_empty() {
            map.serialize_entry("method", &self.method)?;
        }
        if !self.path.is_empty() {
            map.serialize_entry("path", &self.path)?;
        }
        map.serialize_entry("protocol", &self.protocol)?;
        if self.is_reply() {
            map.serialize_entry("code", &self.code)?;
            map.serialize_entry("phrase", &self.phrase)?;
            map.serialize_entry("data", &self.data)?;
        }
        map.end()
    }
}

// Older servers sent some codes as JSON numbers; normalise to a string.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct CodeVisitor;

    impl Visitor<'_> for CodeVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a status code as string or integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<String, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(CodeVisitor)
}
