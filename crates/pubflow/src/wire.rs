// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire encoding of publish requests.
//!
//! Messages are encoded as protobuf `PubsubMessage` records and a request as
//! a `PublishRequest`:
//!
//! ```text
//! PubsubMessage   { 1: bytes data, 2: map<string,string> attributes, 5: string ordering_key }
//! PublishRequest  { 1: string topic, 2: repeated PubsubMessage messages }
//! ```
//!
//! Only length-delimited fields are used. [`encoded_len`] is what bundling and
//! flow control account for, so it must match [`encode_message`] byte for byte.

use crate::message::Message;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

const WIRE_TYPE_LEN: u8 = 2;

const MSG_DATA: u8 = 1;
const MSG_ATTRIBUTES: u8 = 2;
const MSG_ORDERING_KEY: u8 = 5;

const ENTRY_KEY: u8 = 1;
const ENTRY_VALUE: u8 = 2;

const REQ_TOPIC: u8 = 1;
const REQ_MESSAGES: u8 = 2;

/// Decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Input ended in the middle of a field.
    #[error("truncated input")]
    Truncated,
    /// Varint longer than 10 bytes.
    #[error("malformed varint")]
    BadVarint,
    /// Field with a wire type other than length-delimited.
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
    /// String field is not valid UTF-8.
    #[error("string field contains invalid UTF-8")]
    InvalidUtf8,
    /// Gzip stream could not be decoded.
    #[error("gzip: {0}")]
    Gzip(String),
}

// ============================================================================
// Sizes
// ============================================================================

/// Bytes needed to encode `v` as a varint.
pub fn varint_len(v: u64) -> usize {
    let bits = 64 - (v | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Size of a length-delimited field (tag + length + payload).
#[inline]
fn field_len(payload: usize) -> usize {
    1 + varint_len(payload as u64) + payload
}

fn entry_len(key: &str, value: &str) -> usize {
    field_len(key.len()) + field_len(value.len())
}

/// Encoded size of a message.
pub fn encoded_len(msg: &Message) -> usize {
    let mut n = 0;
    if !msg.data().is_empty() {
        n += field_len(msg.data().len());
    }
    for (k, v) in msg.attributes() {
        n += field_len(entry_len(k, v));
    }
    if msg.is_ordered() {
        n += field_len(msg.ordering_key().len());
    }
    n
}

// ============================================================================
// Encoding
// ============================================================================

fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

fn put_field(buf: &mut Vec<u8>, field: u8, payload: &[u8]) {
    buf.push((field << 3) | WIRE_TYPE_LEN);
    put_varint(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}

/// Append the encoding of `msg` to `buf`.
pub fn encode_message_into(buf: &mut Vec<u8>, msg: &Message) {
    if !msg.data().is_empty() {
        put_field(buf, MSG_DATA, msg.data());
    }
    // Sorted for deterministic output.
    let mut attrs: Vec<_> = msg.attributes().iter().collect();
    attrs.sort_unstable();
    for (k, v) in attrs {
        buf.push((MSG_ATTRIBUTES << 3) | WIRE_TYPE_LEN);
        put_varint(buf, entry_len(k, v) as u64);
        put_field(buf, ENTRY_KEY, k.as_bytes());
        put_field(buf, ENTRY_VALUE, v.as_bytes());
    }
    if msg.is_ordered() {
        put_field(buf, MSG_ORDERING_KEY, msg.ordering_key().as_bytes());
    }
}

/// Encode a message.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(msg));
    encode_message_into(&mut buf, msg);
    buf
}

/// Encode a publish request from already encoded messages.
pub fn encode_request(topic: &str, messages: &[Vec<u8>]) -> Vec<u8> {
    let total = field_len(topic.len()) + messages.iter().map(|m| field_len(m.len())).sum::<usize>();
    let mut buf = Vec::with_capacity(total);
    put_field(&mut buf, REQ_TOPIC, topic.as_bytes());
    for m in messages {
        put_field(&mut buf, REQ_MESSAGES, m);
    }
    buf
}

// ============================================================================
// Decoding
// ============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, WireError> {
        let mut v = 0u64;
        for shift in (0..70).step_by(7) {
            let b = *self.buf.get(self.pos).ok_or(WireError::Truncated)?;
            self.pos += 1;
            v |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
        }
        Err(WireError::BadVarint)
    }

    /// Next length-delimited field as `(field number, payload)`.
    fn field(&mut self) -> Result<(u8, &'a [u8]), WireError> {
        let tag = self.varint()?;
        let wire_type = (tag & 0x7) as u8;
        if wire_type != WIRE_TYPE_LEN {
            return Err(WireError::UnsupportedWireType(wire_type));
        }
        let len = self.varint()? as usize;
        let end = self.pos.checked_add(len).ok_or(WireError::Truncated)?;
        let payload = self.buf.get(self.pos..end).ok_or(WireError::Truncated)?;
        self.pos = end;
        Ok(((tag >> 3) as u8, payload))
    }
}

fn utf8(bytes: &[u8]) -> Result<String, WireError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
}

/// Decode a message. Unknown fields are skipped.
pub fn decode_message(buf: &[u8]) -> Result<Message, WireError> {
    let mut r = Reader::new(buf);
    let mut data = Vec::new();
    let mut attributes = HashMap::new();
    let mut ordering_key = String::new();

    while !r.is_empty() {
        match r.field()? {
            (MSG_DATA, payload) => data = payload.to_vec(),
            (MSG_ATTRIBUTES, payload) => {
                let mut entry = Reader::new(payload);
                let (mut key, mut value) = (String::new(), String::new());
                while !entry.is_empty() {
                    match entry.field()? {
                        (ENTRY_KEY, k) => key = utf8(k)?,
                        (ENTRY_VALUE, v) => value = utf8(v)?,
                        _ => {}
                    }
                }
                attributes.insert(key, value);
            }
            (MSG_ORDERING_KEY, payload) => ordering_key = utf8(payload)?,
            _ => {}
        }
    }

    Ok(Message::new(data)
        .with_attributes(attributes)
        .with_ordering_key(ordering_key))
}

/// Decode a publish request into its topic and encoded messages.
pub fn decode_request(buf: &[u8]) -> Result<(String, Vec<Vec<u8>>), WireError> {
    let mut r = Reader::new(buf);
    let mut topic = String::new();
    let mut messages = Vec::new();
    while !r.is_empty() {
        match r.field()? {
            (REQ_TOPIC, payload) => topic = utf8(payload)?,
            (REQ_MESSAGES, payload) => messages.push(payload.to_vec()),
            _ => {}
        }
    }
    Ok((topic, messages))
}

// ============================================================================
// Compression
// ============================================================================

/// Gzip `data` at the default level.
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Reverse of [`gzip`].
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| WireError::Gzip(e.to_string()))?;
    Ok(out)
}
