//! Compression backends for blob payloads.
//!
//! Compression applies to individual blobs only, never to the file as a
//! whole. The identifier is stored as a single byte in the blob header, so
//! files stay readable by implementations that lack a given backend (they
//! can still skip the blob).

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Per-blob compression method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// Store bytes as-is. Required for in-place editing and the only mode
    /// with an alignment guarantee.
    #[default]
    None,
    /// Zlib (DEFLATE) compression, as in zip files and PNG.
    Zlib,
    /// Bz2 compression. More compact than zlib but slower to write.
    Bz2,
}

impl Compression {
    /// The wire identifier stored in blob headers.
    pub(crate) fn into_u8(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zlib => 1,
            Compression::Bz2 => 2,
        }
    }

    /// Construct from a wire identifier.
    pub(crate) fn from_u8(v: u8) -> Result<Compression> {
        match v {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zlib),
            2 => Ok(Compression::Bz2),
            _ => Err(Error::Format(format!("unknown compression identifier {}", v))),
        }
    }

    /// Compress `data` into a fresh buffer. `Compression::None` copies.
    pub(crate) fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Zlib => {
                let mut enc =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(data)?;
                Ok(enc.finish()?)
            }
            Compression::Bz2 => {
                let mut enc =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                enc.write_all(data)?;
                Ok(enc.finish()?)
            }
        }
    }

    /// Decompress `data` into a fresh buffer. `Compression::None` copies.
    pub(crate) fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Compression::None => out.extend_from_slice(data),
            Compression::Zlib => {
                flate2::read::ZlibDecoder::new(data).read_to_end(&mut out)?;
            }
            Compression::Bz2 => {
                bzip2::read::BzDecoder::new(data).read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }
}
