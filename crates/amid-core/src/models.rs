//! Shared data model
//!
//! `Headers` keeps AMI header lines in wire order. `BusEvent` is the envelope
//! published on the message bus for every AMI message.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Ordered `Key: Value` pairs of one AMI frame
///
/// Duplicate keys are kept: Asterisk repeats some headers (`Variable`,
/// `ChanVariable`) within a single event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, keeping any earlier value for the same key
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value for `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in wire order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Serialized as a JSON object: keys keep the position of their first
/// occurrence, a repeated key takes its last value.
impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(self.0.len());
        let mut entries: Vec<(&str, &str)> = Vec::with_capacity(self.0.len());

        for (key, value) in &self.0 {
            match positions.get(key.as_str()) {
                Some(&idx) => entries[idx].1 = value.as_str(),
                None => {
                    positions.insert(key.as_str(), entries.len());
                    entries.push((key.as_str(), value.as_str()));
                }
            }
        }

        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Envelope of one AMI message republished on the bus
#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    /// AMI event or response name (`Newchannel`, `Hangup`, `Success`...)
    pub name: String,

    /// Service instance that published the event
    pub origin_uuid: Uuid,

    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Access rule consumers need to receive the event
    pub required_access: String,

    /// The AMI headers, in wire order
    pub data: Headers,

    #[serde(skip)]
    routing_key: String,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl BusEvent {
    pub fn ami(name: impl Into<String>, data: Headers, origin_uuid: Uuid) -> Self {
        let name = name.into();
        Self {
            routing_key: format!("ami.{}", name),
            required_access: format!("event.ami.{}", name),
            name,
            origin_uuid,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Topic the event is published under (`ami.<name>`)
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// JSON payload sent on the wire
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
