//! Library error types.

use std::fmt;
use std::io;

use crate::serializer::FORMAT_VERSION;

/// A BSDF Result, normally returning a BSDF [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A BSDF error. Encompasses any issue that can happen while encoding or
/// decoding data, or while operating on a stream or blob handle.
#[derive(Debug)]
pub enum Error {
    /// The data is not valid BSDF: wrong magic, unknown type tag, unknown
    /// size marker, or unknown compression identifier.
    Format(String),
    /// The file was written with a different major format version.
    Version {
        /// The (major, minor) version found in the file header.
        file: (u8, u8),
    },
    /// A string or extension name is not valid UTF-8, an integer falls
    /// outside the signed 64-bit range, or a value cannot be expressed in
    /// the requested form.
    Encoding(String),
    /// The value has no base-type encoding and no registered extension
    /// accepts it. Carries the name of the offending type.
    NotEncodable(String),
    /// A structural rule was broken: more than one stream in a file, a
    /// stream that is not the final object, or a stream handle reused
    /// across encodes.
    Structural(&'static str),
    /// An extension's `to_base` returned a value that selects the same
    /// extension again.
    ExtensionRecursion(String),
    /// A seek, read, or write on a blob handle fell outside its bounds.
    Bounds {
        /// The offending position within the blob. Negative when a
        /// seek-from-end resolved before the start of the payload.
        pos: i64,
        /// The number of payload bytes the blob holds.
        used_size: u64,
    },
    /// The operation is not available for this value, e.g. random access
    /// into a compressed blob.
    Unsupported(&'static str),
    /// A blob checksum did not match its payload.
    Integrity,
    /// Value nesting exceeded the recursion limit.
    DepthLimit,
    /// Failure in the underlying byte source or sink.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Format(ref err) => write!(f, "Not valid BSDF data: {}", err),
            Error::Version { file } => write!(
                f,
                "File has major format version {}.{}, implementation has {}.{}",
                file.0, file.1, FORMAT_VERSION.0, FORMAT_VERSION.1
            ),
            Error::Encoding(ref err) => write!(f, "Encoding failure: {}", err),
            Error::NotEncodable(ref ty) => write!(
                f,
                "Type {} is not a valid base BSDF type, nor is it handled by an extension",
                ty
            ),
            Error::Structural(err) => write!(f, "Structural error: {}", err),
            Error::ExtensionRecursion(ref name) => write!(
                f,
                "Extension {:?} re-selected itself while converting to base types",
                name
            ),
            Error::Bounds { pos, used_size } => write!(
                f,
                "Position {} is beyond the blob boundary of {} used bytes",
                pos, used_size
            ),
            Error::Unsupported(err) => write!(f, "Unsupported operation: {}", err),
            Error::Integrity => write!(f, "Blob checksum does not match its payload"),
            Error::DepthLimit => write!(f, "Value nesting exceeded the recursion limit"),
            Error::Io(ref err) => write!(f, "I/O failure: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
