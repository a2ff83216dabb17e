//! Garden records and connection form models.
//!
//! A garden travels in two shapes: the server record ([`GardenRecord`]) whose
//! `connection_params` hold complete STOMP header pairs, and the editable
//! form ([`GardenForm`]) whose header rows may be half filled in. Decoding is
//! tolerant: unknown record fields are carried through untouched, ports may
//! arrive as numbers or strings, and STOMP headers may arrive as a sequence
//! of pairs or as a mapping.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

/// Entry-point key for HTTP connection parameters.
pub const HTTP: &str = "http";
/// Entry-point key for STOMP connection parameters.
pub const STOMP: &str = "stomp";

/// How a garden is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionType {
    Http,
    Stomp,
    /// The garden this server runs; it has no connection of its own.
    Local,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("HTTP"),
            Self::Stomp => f.write_str("STOMP"),
            Self::Local => f.write_str("LOCAL"),
        }
    }
}

/// A garden as the server stores it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GardenRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub connection_type: Option<ConnectionType>,
    #[serde(default)]
    pub connection_params: Option<ConnectionParams>,
    /// Server-managed fields (`status_info`, `namespaces`, `systems`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GardenRecord {
    /// Whether this is the server's own garden, whose connection settings
    /// cannot be edited.
    pub fn is_local(&self) -> bool {
        self.id.is_none() || self.connection_type == Some(ConnectionType::Local)
    }
}

/// Server-side connection parameters, one optional block per entry point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stomp: Option<StompParams>,
}

impl ConnectionParams {
    pub const fn is_empty(&self) -> bool {
        self.http.is_none() && self.stomp.is_none()
    }
}

/// HTTP entry-point parameters. The same shape is used by the form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

impl HttpParams {
    /// An HTTP entry point counts as unconfigured when none of its
    /// addressing or certificate fields carry a value. The boolean toggles
    /// and `client_key` do not count.
    pub fn is_empty(&self) -> bool {
        self.port.is_none()
            && [
                &self.ca_cert,
                &self.client_cert,
                &self.host,
                &self.url_prefix,
            ]
            .into_iter()
            .all(is_blank)
    }
}

/// SSL block of a STOMP entry point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StompSsl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_ssl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

impl StompSsl {
    /// `use_ssl` alone does not make the block configured.
    pub fn is_blank(&self) -> bool {
        [&self.ca_cert, &self.client_cert, &self.client_key]
            .into_iter()
            .all(is_blank)
    }
}

/// A complete STOMP header as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StompHeader {
    pub key: String,
    pub value: String,
}

/// A header row in the form; either side may still be missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl HeaderPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
        }
    }

    /// The pair as a server header, if both sides carry text.
    pub fn complete(&self) -> Option<StompHeader> {
        match (self.key.as_deref(), self.value.as_deref()) {
            (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => {
                Some(StompHeader {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// STOMP entry-point parameters as the server stores them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StompParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe_destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<StompSsl>,
    #[serde(default, alias = "stomp_headers", deserialize_with = "server_headers")]
    pub headers: Vec<StompHeader>,
}

impl StompParams {
    /// A STOMP entry point counts as unconfigured when it has no headers, no
    /// addressing or credential field carries a value, and its SSL block (if
    /// any) holds no certificate material.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.port.is_none()
            && [
                &self.host,
                &self.password,
                &self.send_destination,
                &self.subscribe_destination,
                &self.username,
            ]
            .into_iter()
            .all(is_blank)
            && self.ssl.as_ref().is_none_or(StompSsl::is_blank)
    }
}

/// STOMP entry-point parameters as the form edits them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StompForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe_destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<StompSsl>,
    #[serde(default, alias = "stomp_headers", deserialize_with = "form_headers")]
    pub headers: Vec<HeaderPair>,
}

/// The editable, tab-structured view of a garden's connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GardenForm {
    #[serde(default)]
    pub connection_type: Option<ConnectionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stomp: Option<StompForm>,
}

/// Absent, null and empty strings all count as "no value".
pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

fn lenient_port<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(i64),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(port)) => Ok(Some(port)),
        Some(RawPort::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid port: {text:?}")))
        }
    }
}

fn server_headers<'de, D>(deserializer: D) -> Result<Vec<StompHeader>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserializer
        .deserialize_any(HeaderPairsVisitor)?
        .into_iter()
        .map(|pair| StompHeader {
            key: pair.key.unwrap_or_default(),
            value: pair.value.unwrap_or_default(),
        })
        .collect())
}

fn form_headers<'de, D>(deserializer: D) -> Result<Vec<HeaderPair>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(HeaderPairsVisitor)
}

/// Accepts `[{"key": .., "value": ..}, ..]`, `{"name": "value", ..}` or null.
/// Mapping entries keep their document order.
struct HeaderPairsVisitor;

impl<'de> de::Visitor<'de> for HeaderPairsVisitor {
    type Value = Vec<HeaderPair>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence of {key, value} pairs or a header mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        let mut pairs = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(pair) = seq.next_element::<HeaderPair>()? {
            pairs.push(pair);
        }
        Ok(pairs)
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            let value = match value {
                Value::Null => None,
                Value::String(text) => Some(text),
                other => Some(other.to_string()),
            };
            pairs.push(HeaderPair {
                key: Some(key),
                value,
            });
        }
        Ok(pairs)
    }
}
