//! Rust implementation of the Binary Structured Data Format (BSDF).
//!
//! BSDF is a compact, self-describing binary format for structured data,
//! comparable in scope to JSON but binary, with first-class support for
//! byte blobs, 64-bit integers, per-blob compression, and user-defined
//! extension types. Beyond plain serialization it supports streaming
//! lists (keep appending to a list after the main file is written) and
//! lazy blobs (bounded random read/write access to blob payloads without
//! materializing them).
//!
//! ```
//! use bsdf::Value;
//!
//! let value = Value::List(vec![
//!     Value::from(42),
//!     Value::from("hello"),
//!     Value::from(vec![0u8, 1, 2]),
//! ]);
//! let bytes = bsdf::encode(&value).unwrap();
//! assert_eq!(bsdf::decode(&bytes).unwrap(), value);
//! ```
//!
//! The free functions use a default [`Serializer`]; build one explicitly
//! to set [`Options`] or to register [`Extension`]s.

use std::io::{Read, Seek, Write};

mod blob;
mod compress;
mod de;
mod error;
mod extension;
mod len;
mod ser;
mod serializer;
mod stream;
mod tag;
mod value;

pub use self::blob::{Blob, LazyBlob};
pub use self::compress::Compression;
pub use self::error::{Error, Result};
pub use self::extension::{Complex, ComplexExtension, Extension, NdArray, NdArrayExtension};
pub use self::serializer::{Options, Serializer, FORMAT_VERSION, MAGIC};
pub use self::stream::ListStream;
pub use self::value::{Custom, Value};

/// Encode a value to bytes with default options and the standard
/// extensions.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Serializer::new().encode(value)
}

/// Decode a value from bytes with default options and the standard
/// extensions.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    Serializer::new().decode(bytes)
}

/// Write a value to the given sink with default options and the standard
/// extensions.
pub fn save<W: Write + Seek>(w: &mut W, value: &Value) -> Result<()> {
    Serializer::new().save(w, value)
}

/// Read a value from the given source with default options and the
/// standard extensions.
pub fn load<R: Read + Seek>(r: &mut R) -> Result<Value> {
    Serializer::new().load(r)
}
