//! Transport-level message envelope and the delimited-tag body format.
//!
//! An [`Envelope`] is the one and only handle onto a wire message: sender,
//! recipient, conversation thread, a searchable body made of
//! `<name>payload</name>` segments, and a metadata side channel that carries
//! the identity facts of a protocol message (its type tag and depth).

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::data::FieldValue;
use crate::error::MessageError;

/// Metadata key holding the concrete message type tag.
pub const METADATA_TYPE: &str = "negotiation.message.type";

/// Metadata key holding the reply depth counter.
pub const METADATA_DEPTH: &str = "negotiation.message.depth";

const SEGMENT_SEPARATOR: &str = "\n";

fn tag_pattern(name: &str) -> Regex {
    let name = regex::escape(name);
    // Payloads may span lines, hence the (?s) flag.
    Regex::new(&format!("(?s)<{name}>(.*?)</{name}>")).expect("valid tag pattern")
}

/// Render one body segment for a named field value.
pub fn render_tag(name: &str, value: &impl FieldValue) -> String {
    format!("<{name}>{}</{name}>", value.serialize())
}

/// A raw transport message.
///
/// Equality and hashing are structural over sender, recipient, thread,
/// metadata and body, so two envelopes that would look identical on the wire
/// compare equal regardless of how they were assembled.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Envelope {
    pub sender: String,
    pub to: String,
    pub thread: String,
    body: String,
    metadata: BTreeMap<String, String>,
}

impl Envelope {
    pub fn new(
        sender: impl Into<String>,
        to: impl Into<String>,
        thread: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            to: to.into(),
            thread: thread.into(),
            body: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The concrete message type tag, if the side channel carries one.
    pub fn type_tag(&self) -> Option<&str> {
        self.get_metadata(METADATA_TYPE)
    }

    /// The reply depth counter from the side channel.
    pub fn depth(&self) -> Result<u32, MessageError> {
        self.get_metadata(METADATA_DEPTH)
            .ok_or(MessageError::InvalidDepth)?
            .parse()
            .map_err(|_| MessageError::InvalidDepth)
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.set_metadata(METADATA_DEPTH, depth.to_string());
    }

    /// Insert or replace the `<name>…</name>` segment for a field.
    ///
    /// Only the named segment changes; every other segment keeps its exact
    /// serialized form.
    pub fn pack_field(&mut self, name: &str, value: &impl FieldValue) {
        let rendered = value.serialize();
        if let Some(m) = tag_pattern(name).find(&self.body) {
            let (start, end) = (m.start(), m.end());
            let mut body = String::with_capacity(self.body.len() + rendered.len());
            body.push_str(&self.body[..start]);
            body.push_str(&format!("<{name}>{rendered}</{name}>"));
            body.push_str(&self.body[end..]);
            self.body = body;
        } else if self.body.is_empty() {
            self.body = format!("<{name}>{rendered}</{name}>");
        } else {
            self.body = format!("{}{SEGMENT_SEPARATOR}<{name}>{rendered}</{name}>", self.body);
        }
    }

    /// Drop the named segment, if present, along with its separator.
    pub fn remove_field(&mut self, name: &str) {
        if let Some(m) = tag_pattern(name).find(&self.body) {
            let mut start = m.start();
            let mut end = m.end();
            if start > 0 && self.body.as_bytes()[start - 1] == b'\n' {
                start -= 1;
            } else if self.body.as_bytes().get(end) == Some(&b'\n') {
                end += 1;
            }
            let mut body = String::with_capacity(self.body.len() - (end - start));
            body.push_str(&self.body[..start]);
            body.push_str(&self.body[end..]);
            self.body = body;
        }
    }

    /// Look up and parse the named field. Lookup is order-insensitive; a
    /// missing segment or an empty payload reads as absent.
    pub fn unpack_field<T: FieldValue>(
        &self,
        name: &'static str,
    ) -> Result<Option<T>, MessageError> {
        let captures = match tag_pattern(name).captures(&self.body) {
            Some(captures) => captures,
            None => return Ok(None),
        };
        let content = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        if content.is_empty() {
            return Ok(None);
        }
        T::parse(content)
            .map(Some)
            .map_err(|source| MessageError::UnparsableField { name, source })
    }

    /// A blank reply addressed back at the sender on the same thread.
    ///
    /// The body and metadata start empty; the typed message layer stamps the
    /// new type tag and depth before packing fields.
    pub fn reply_shell(&self) -> Envelope {
        Envelope::new(self.to.clone(), self.sender.clone(), self.thread.clone())
    }
}
