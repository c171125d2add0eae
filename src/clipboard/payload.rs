//! Clipboard Payload Model
//!
//! A [`Payload`] is everything exchanged in one transfer: an ordered list of
//! [`Item`]s, each an ordered list of alternative [`Representation`]s of the
//! same clipboard entry (plain text, RTF and HTML of one selection, or a PNG and
//! a TIFF of one image).

use crate::clipboard::error::{ClipboardError, Result};
use crate::protocol::{self, MAX_REPRESENTATIONS, SENTINEL};
use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};

/// One encoding of an item's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    /// Opaque type identifier (MIME type or platform UTI)
    pub type_tag: String,

    /// Raw content
    pub data: Bytes,
}

impl Representation {
    /// Create a representation
    pub fn new(type_tag: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            type_tag: type_tag.into(),
            data: data.into(),
        }
    }

    /// Bytes this representation occupies on the wire
    pub fn encoded_len(&self) -> usize {
        2 * protocol::LENGTH_PREFIX_SIZE + self.type_tag.len() + self.data.len()
    }
}

/// One clipboard entry with 1-255 alternative representations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    representations: Vec<Representation>,
}

impl Item {
    /// Create an item, enforcing the 1-255 representation bound
    pub fn new(representations: Vec<Representation>) -> Result<Self> {
        if representations.is_empty() || representations.len() > MAX_REPRESENTATIONS {
            return Err(ClipboardError::InvalidItem(representations.len()));
        }
        Ok(Self { representations })
    }

    /// Convenience constructor for a single-representation item
    pub fn single(type_tag: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            representations: vec![Representation::new(type_tag, data)],
        }
    }

    /// Representations in preference order
    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    /// Find the first representation with the given type tag
    pub fn representation(&self, type_tag: &str) -> Option<&Representation> {
        self.representations
            .iter()
            .find(|rep| rep.type_tag == type_tag)
    }

    /// Type tags in preference order
    pub fn type_tags(&self) -> impl Iterator<Item = &str> {
        self.representations.iter().map(|rep| rep.type_tag.as_str())
    }

    /// Bytes this item occupies on the wire
    pub fn encoded_len(&self) -> usize {
        protocol::REP_COUNT_SIZE
            + self
                .representations
                .iter()
                .map(Representation::encoded_len)
                .sum::<usize>()
    }
}

/// Full set of items exchanged in one transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    items: Vec<Item>,
}

impl Payload {
    /// Create a payload from items
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Items in order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the payload carries no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bytes the payload occupies on the wire, sentinel included
    pub fn encoded_len(&self) -> usize {
        self.items.iter().map(Item::encoded_len).sum::<usize>() + protocol::REP_COUNT_SIZE
    }

    /// Serialize to the wire format, sentinel included
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        for item in &self.items {
            // Item::new guarantees 1..=255 representations
            protocol::encode_u8(&mut buf, item.representations.len() as u8);
            for rep in &item.representations {
                protocol::encode_str(&mut buf, &rep.type_tag);
                protocol::encode_blob(&mut buf, &rep.data);
            }
        }
        protocol::encode_u8(&mut buf, SENTINEL);
        buf.freeze()
    }

    /// SHA-256 of the wire encoding, as lowercase hex.
    ///
    /// Hashes the same byte layout as [`Payload::encode`] without building the
    /// buffer.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for item in &self.items {
            hasher.update([item.representations.len() as u8]);
            for rep in &item.representations {
                hasher.update((rep.type_tag.len() as u64).to_be_bytes());
                hasher.update(rep.type_tag.as_bytes());
                hasher.update((rep.data.len() as u64).to_be_bytes());
                hasher.update(&rep.data);
            }
        }
        hasher.update([SENTINEL]);
        format!("{:x}", hasher.finalize())
    }
}
