//! Metadata envelope
//!
//! A tag-length-value block folded into every authenticated computation.
//! Each entry is `tag ‖ len ‖ value` with single-byte tag and length, entries
//! appear in strictly increasing tag order, and the block ends with
//! [`Tag::End`].

use crate::error::ProtocolError;
use crate::wire::Tag;

/// Largest value a single entry can carry
pub const MAX_VALUE_LEN: usize = u8::MAX as usize;

/// Ordered TLV builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    buffer: Vec<u8>,
    last_tag: Option<u8>,
}

impl Metadata {
    /// Start an empty envelope
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes under `tag`
    pub fn add_bytes(&mut self, tag: Tag, value: &[u8]) -> Result<&mut Self, ProtocolError> {
        let tag = tag as u8;
        if tag == Tag::End as u8 {
            return Err(ProtocolError::MetadataOrder {
                tag,
                last: self.last_tag.unwrap_or(tag),
            });
        }
        if let Some(last) = self.last_tag {
            if tag <= last {
                return Err(ProtocolError::MetadataOrder { tag, last });
            }
        }
        let len = u8::try_from(value.len()).map_err(|_| ProtocolError::MetadataValueTooLong {
            tag,
            len: value.len(),
        })?;

        self.buffer.push(tag);
        self.buffer.push(len);
        self.buffer.extend_from_slice(value);
        self.last_tag = Some(tag);
        Ok(self)
    }

    /// Append a single byte
    pub fn add_u8(&mut self, tag: Tag, value: u8) -> Result<&mut Self, ProtocolError> {
        self.add_bytes(tag, &[value])
    }

    /// Append a big-endian u32
    pub fn add_u32(&mut self, tag: Tag, value: u32) -> Result<&mut Self, ProtocolError> {
        self.add_bytes(tag, &value.to_be_bytes())
    }

    /// Append the UTF-8 bytes of a string
    pub fn add_str(&mut self, tag: Tag, value: &str) -> Result<&mut Self, ProtocolError> {
        self.add_bytes(tag, value.as_bytes())
    }

    /// Finished envelope including the terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.buffer.len() + 1);
        bytes.extend_from_slice(&self.buffer);
        bytes.push(Tag::End as u8);
        bytes
    }

    /// True when no entries have been added
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
