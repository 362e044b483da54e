// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messages and topic names.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// A message to publish.
///
/// The message is moved into the publisher and never modified afterwards.
///
/// # Example
///
/// ```rust
/// use pubflow::Message;
///
/// let msg = Message::new(b"hello".to_vec())
///     .with_attribute("origin", "sensor-7")
///     .with_ordering_key("device-42");
/// assert_eq!(msg.ordering_key(), "device-42");
/// assert_eq!(msg.attributes().get("origin").map(String::as_str), Some("sensor-7"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
    attributes: HashMap<String, String>,
    ordering_key: String,
}

impl Message {
    /// Create a message with the given payload, no attributes and no ordering key.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            attributes: HashMap::new(),
            ordering_key: String::new(),
        }
    }

    /// Add (or replace) an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace all attributes.
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set the ordering key. An empty key means unordered.
    pub fn with_ordering_key(mut self, key: impl Into<String>) -> Self {
        self.ordering_key = key.into();
        self
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Attributes.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Ordering key (empty when unordered).
    pub fn ordering_key(&self) -> &str {
        &self.ordering_key
    }

    /// Whether the message carries an ordering key.
    pub fn is_ordered(&self) -> bool {
        !self.ordering_key.is_empty()
    }

    /// Size of the message once encoded for the wire.
    pub fn encoded_len(&self) -> usize {
        crate::wire::encoded_len(self)
    }
}

/// Fully qualified topic name: `projects/<project>/topics/<id>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicName {
    full: String,
    id_offset: usize,
}

impl TopicName {
    /// Build a topic name from its project and id.
    pub fn new(project: &str, id: &str) -> Result<Self> {
        Self::parse(&format!("projects/{}/topics/{}", project, id))
    }

    /// Parse a fully qualified topic name.
    pub fn parse(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "topics", id] if !project.is_empty() && !id.is_empty() => {
                Ok(Self {
                    full: name.to_string(),
                    id_offset: name.len() - id.len(),
                })
            }
            _ => Err(Error::InvalidTopicName(name.to_string())),
        }
    }

    /// Project segment.
    pub fn project(&self) -> &str {
        // "projects/" is 9 bytes, "/topics/" is 8 bytes
        &self.full["projects/".len()..self.id_offset - "/topics/".len()]
    }

    /// Topic id, unique within its project.
    pub fn id(&self) -> &str {
        &self.full[self.id_offset..]
    }

    /// Full name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl std::str::FromStr for TopicName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
