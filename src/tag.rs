//! Single-byte type tags. ASCII was chosen for debuggability: a hexdump of
//! a BSDF file shows the value kinds in plain text. An uppercased tag means
//! the value is wrapped by a named extension; the structural layout that
//! follows is identical to the lowercase form.

use crate::error::{Error, Result};

/// The structural kind of a value on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tag {
    Null,
    True,
    False,
    Int16,
    Int64,
    Float32,
    Float64,
    Str,
    List,
    Map,
    Blob,
}

impl Tag {
    /// The lowercase tag byte.
    pub fn into_u8(self) -> u8 {
        match self {
            Tag::Null => b'v',
            Tag::True => b'y',
            Tag::False => b'n',
            Tag::Int16 => b'h',
            Tag::Int64 => b'i',
            Tag::Float32 => b'f',
            Tag::Float64 => b'd',
            Tag::Str => b's',
            Tag::List => b'l',
            Tag::Map => b'm',
            Tag::Blob => b'b',
        }
    }

    /// Construct from a lowercase tag byte. Returns `None` for bytes outside
    /// the tag set.
    pub fn from_u8(b: u8) -> Option<Tag> {
        match b {
            b'v' => Some(Tag::Null),
            b'y' => Some(Tag::True),
            b'n' => Some(Tag::False),
            b'h' => Some(Tag::Int16),
            b'i' => Some(Tag::Int64),
            b'f' => Some(Tag::Float32),
            b'd' => Some(Tag::Float64),
            b's' => Some(Tag::Str),
            b'l' => Some(Tag::List),
            b'm' => Some(Tag::Map),
            b'b' => Some(Tag::Blob),
            _ => None,
        }
    }
}

/// A tag byte as read from the wire: the kind plus whether the uppercase
/// (extension-wrapped) form was used.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WireTag {
    pub tag: Tag,
    pub extended: bool,
}

impl WireTag {
    pub fn parse(b: u8) -> Result<WireTag> {
        let lower = b.to_ascii_lowercase();
        match Tag::from_u8(lower) {
            Some(tag) => Ok(WireTag {
                tag,
                extended: b != lower,
            }),
            None => Err(Error::Format(format!("unknown type tag 0x{:02x}", b))),
        }
    }
}
