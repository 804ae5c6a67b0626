use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{de::DeserializeOwned, Serialize};

use crate::{DecodeError, Error, Result};

mod test;

const MAGIC: &[u8; 4] = b"CGEN";
/// Version of the snapshot layout, bumped on incompatible changes.
pub const VERSION: u16 = 1;
// tag + payload length
const HEADER_LEN: usize = 1 + 4;

/// Kind of element stored in a [Marsh].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum Tag {
    Cgen = 1,
    Front = 2,
    Chain = 3,
    ProgramSet = 4,
    Program = 5,
}

/// Tagged byte container.
///
/// A leaf holds an opaque payload, a node holds a sequence of encoded
/// children. Each entity encodes itself through [Marshal] and delegates to
/// the entities it contains.
///
/// Wire format of an element: `tag: u8`, `len: u32` (little endian), then
/// `len` bytes of payload. A snapshot prefixes the root element with a magic
/// and a `u16` version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marsh {
    tag: Tag,
    data: Bytes,
}

/// Conversion from and to a [Marsh].
pub trait Marshal: Sized {
    fn marsh(&self) -> Result<Marsh>;
    fn unmarsh(marsh: Marsh) -> Result<Self>;
}

impl Marsh {
    pub fn leaf(tag: Tag, data: impl Into<Bytes>) -> Self {
        Self {
            tag,
            data: data.into(),
        }
    }

    pub fn node(tag: Tag, children: impl IntoIterator<Item = Marsh>) -> Result<Self> {
        let mut data = BytesMut::new();
        for child in children {
            child.write(&mut data)?;
        }

        Ok(Self {
            tag,
            data: data.freeze(),
        })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Fails unless the element is tagged `tag`.
    pub fn expect(self, tag: Tag) -> std::result::Result<Self, DecodeError> {
        if self.tag == tag {
            Ok(self)
        } else {
            Err(DecodeError::UnexpectedTag {
                expected: tag,
                found: self.tag,
            })
        }
    }

    /// Decodes the payload as a sequence of elements.
    pub fn children(&self) -> Children {
        Children {
            buf: self.data.clone(),
        }
    }

    /// Encodes the element as a standalone snapshot.
    pub fn to_snapshot(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(MAGIC.len() + 2 + HEADER_LEN + self.data.len());
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        self.write(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes a snapshot produced by [to_snapshot](Self::to_snapshot).
    pub fn from_snapshot(snapshot: &[u8]) -> std::result::Result<Self, DecodeError> {
        let mut buf = Bytes::copy_from_slice(snapshot);
        ensure_remaining(&buf, MAGIC.len() + 2)?;
        if &buf.split_to(MAGIC.len())[..] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = buf.get_u16_le();
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let root = Self::read(&mut buf)?;
        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(buf.remaining()));
        }

        Ok(root)
    }

    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        let len = u32::try_from(self.data.len()).map_err(|_| Error::Encode {
            what: "element",
            reason: format!("{:?} payload of {} bytes is too large", self.tag, self.data.len()),
        })?;
        buf.reserve(HEADER_LEN + self.data.len());
        buf.put_u8(self.tag as u8);
        buf.put_u32_le(len);
        buf.put_slice(&self.data);
        Ok(())
    }

    fn read(buf: &mut Bytes) -> std::result::Result<Self, DecodeError> {
        ensure_remaining(buf, HEADER_LEN)?;
        let raw_tag = buf.get_u8();
        let tag = Tag::from_u8(raw_tag).ok_or(DecodeError::UnknownTag(raw_tag))?;
        let len = buf.get_u32_le() as usize;
        ensure_remaining(buf, len)?;

        Ok(Self {
            tag,
            data: buf.split_to(len),
        })
    }
}

/// Iterator over the children of a node, see [Marsh::children].
///
/// Stops after the first decoding error.
#[derive(Debug)]
pub struct Children {
    buf: Bytes,
}

impl Children {
    /// Next child, which must exist and be tagged `tag`.
    pub fn expect(&mut self, tag: Tag) -> std::result::Result<Marsh, DecodeError> {
        self.next().ok_or(DecodeError::Missing(tag))??.expect(tag)
    }

    /// Fails if any child is left.
    pub fn finish(mut self) -> std::result::Result<(), DecodeError> {
        match self.next() {
            None => Ok(()),
            Some(child) => Err(DecodeError::Extra(child?.tag)),
        }
    }
}

impl Iterator for Children {
    type Item = std::result::Result<Marsh, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.buf.has_remaining() {
            return None;
        }

        let child = Marsh::read(&mut self.buf);
        if child.is_err() {
            self.buf.clear();
        }
        Some(child)
    }
}

fn ensure_remaining(buf: &Bytes, needed: usize) -> std::result::Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn json_leaf<T: Serialize>(tag: Tag, value: &T) -> Result<Marsh> {
    let data = serde_json::to_vec(value).map_err(|err| Error::Encode {
        what: tag_name(tag),
        reason: err.to_string(),
    })?;
    Ok(Marsh::leaf(tag, data))
}

pub(crate) fn from_json_leaf<T: DeserializeOwned>(marsh: Marsh, tag: Tag) -> Result<T> {
    let marsh = marsh.expect(tag)?;
    serde_json::from_slice(marsh.data()).map_err(|err| {
        DecodeError::Malformed {
            what: tag,
            reason: err.to_string(),
        }
        .into()
    })
}

fn tag_name(tag: Tag) -> &'static str {
    match tag {
        Tag::Cgen => "codegen",
        Tag::Front => "front",
        Tag::Chain => "chain",
        Tag::ProgramSet => "program set",
        Tag::Program => "program",
    }
}
