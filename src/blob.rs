//! The blob sub-format: byte payloads with storage metadata.
//!
//! A blob stores three sizes (allocated, used, logical), a compression
//! identifier, an optional MD5 checksum of the stored payload, and padding
//! that 8-aligns the payload of uncompressed blobs within the file. The
//! allocated size may exceed the used size, leaving headroom for in-place
//! edits through [`LazyBlob`].

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::compress::Compression;
use crate::error::{Error, Result};
use crate::len;

const CHECKSUM_ABSENT: u8 = 0x00;
const CHECKSUM_PRESENT: u8 = 0xFF;
const PAD: [u8; 8] = [0; 8];

/// A blob of bytes inside a [`Value`](crate::Value).
///
/// On the write side a blob wraps in-memory bytes plus per-blob settings
/// (compression, checksum, allocation headroom) that override the
/// serializer's defaults. On the read side, a blob is either the fully
/// materialized bytes or, when decoding with the `lazy_blob` option, a
/// [`LazyBlob`] handle into the underlying file.
#[derive(Clone, Debug)]
pub struct Blob {
    pub(crate) repr: Repr,
}

#[derive(Clone, Debug)]
pub(crate) enum Repr {
    Owned {
        data: Vec<u8>,
        compression: Option<Compression>,
        use_checksum: Option<bool>,
        extra_size: u64,
    },
    Lazy(LazyBlob),
}

impl Blob {
    /// Wrap bytes for encoding. Compression and checksum settings are
    /// inherited from the serializer unless overridden with the builder
    /// methods.
    pub fn new(data: impl Into<Vec<u8>>) -> Blob {
        Blob {
            repr: Repr::Owned {
                data: data.into(),
                compression: None,
                use_checksum: None,
                extra_size: 0,
            },
        }
    }

    /// Override the serializer's compression setting for this blob.
    ///
    /// # Panics
    ///
    /// Panics on a lazy blob handle. Storage settings are fixed once a
    /// blob is on disk; edit it through [`LazyBlob`] instead.
    pub fn with_compression(mut self, c: Compression) -> Blob {
        match self.repr {
            Repr::Owned {
                ref mut compression,
                ..
            } => *compression = Some(c),
            Repr::Lazy(_) => panic!("cannot configure a lazy blob handle"),
        }
        self
    }

    /// Allocate `n` spare bytes after the payload, so the stored blob can
    /// later grow or be partially rewritten in place.
    ///
    /// # Panics
    ///
    /// Panics on a lazy blob handle. Storage settings are fixed once a
    /// blob is on disk; edit it through [`LazyBlob`] instead.
    pub fn with_extra_size(mut self, n: u64) -> Blob {
        match self.repr {
            Repr::Owned {
                ref mut extra_size, ..
            } => *extra_size = n,
            Repr::Lazy(_) => panic!("cannot configure a lazy blob handle"),
        }
        self
    }

    /// Override the serializer's checksum setting for this blob.
    ///
    /// # Panics
    ///
    /// Panics on a lazy blob handle. Storage settings are fixed once a
    /// blob is on disk; edit it through [`LazyBlob`] instead.
    pub fn with_checksum(mut self, enabled: bool) -> Blob {
        match self.repr {
            Repr::Owned {
                ref mut use_checksum,
                ..
            } => *use_checksum = Some(enabled),
            Repr::Lazy(_) => panic!("cannot configure a lazy blob handle"),
        }
        self
    }

    /// The logical bytes, if this blob holds them in memory.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self.repr {
            Repr::Owned { ref data, .. } => Some(data.as_slice()),
            Repr::Lazy(_) => None,
        }
    }

    /// Whether this blob is a lazy file handle rather than owned bytes.
    pub fn is_lazy(&self) -> bool {
        matches!(self.repr, Repr::Lazy(_))
    }

    /// The lazy handle, when decoded with the `lazy_blob` option.
    pub fn as_lazy(&self) -> Option<&LazyBlob> {
        match self.repr {
            Repr::Lazy(ref lazy) => Some(lazy),
            Repr::Owned { .. } => None,
        }
    }

    pub fn as_lazy_mut(&mut self) -> Option<&mut LazyBlob> {
        match self.repr {
            Repr::Lazy(ref mut lazy) => Some(lazy),
            Repr::Owned { .. } => None,
        }
    }

    /// Write the blob sub-format, resolving per-blob overrides against the
    /// serializer defaults.
    pub(crate) fn write<W: Write + Seek>(
        &self,
        w: &mut W,
        default_compression: Compression,
        default_checksum: bool,
    ) -> Result<()> {
        let (data, compression, use_checksum, extra_size) = match self.repr {
            Repr::Owned {
                ref data,
                compression,
                use_checksum,
                extra_size,
            } => (
                data,
                compression.unwrap_or(default_compression),
                use_checksum.unwrap_or(default_checksum),
                extra_size,
            ),
            Repr::Lazy(_) => {
                return Err(Error::Unsupported(
                    "a lazy blob handle cannot be re-encoded",
                ))
            }
        };

        let stored = compression.compress(data)?;
        let data_size = data.len() as u64;
        let used_size = stored.len() as u64;
        let allocated_size = used_size + extra_size;

        // Compact size fields when they can never need widening; wide
        // fields otherwise, so an in-place editor can rewrite sizes without
        // shifting the payload.
        if allocated_size <= len::SMALL_MAX && compression == Compression::None {
            len::write_len(w, allocated_size)?;
            len::write_len(w, used_size)?;
            len::write_len(w, data_size)?;
        } else {
            len::write_len_wide(w, allocated_size)?;
            len::write_len_wide(w, used_size)?;
            len::write_len_wide(w, data_size)?;
        }

        w.write_u8(compression.into_u8())?;
        if use_checksum {
            w.write_u8(CHECKSUM_PRESENT)?;
            w.write_all(&md5::compute(&stored).0)?;
        } else {
            w.write_u8(CHECKSUM_ABSENT)?;
        }

        // Alignment matters only for uncompressed data, where the payload
        // may be mapped or edited in place.
        if compression == Compression::None {
            let pos = w.stream_position()?;
            let alignment = ((8 - ((pos + 1) % 8)) % 8) as u8;
            w.write_u8(alignment)?;
            w.write_all(&PAD[..alignment as usize])?;
        } else {
            w.write_u8(0)?;
        }

        w.write_all(&stored)?;
        io::copy(&mut io::repeat(0).take(extra_size), w)?;
        Ok(())
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Blob) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Owned { data: a, .. }, Repr::Owned { data: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// The decoded blob header, up to and including the alignment padding.
pub(crate) struct BlobHeader {
    pub allocated_size: u64,
    pub used_size: u64,
    pub data_size: u64,
    pub compression: Compression,
    pub checksum: Option<[u8; 16]>,
    pub digest_offset: u64,
    pub alignment: u8,
    pub start: u64,
}

pub(crate) fn read_header<R: Read + Seek>(r: &mut R) -> Result<BlobHeader> {
    let allocated_size = len::read_len(r)?;
    let used_size = len::read_len(r)?;
    let data_size = len::read_len(r)?;
    if used_size > allocated_size {
        return Err(Error::Format(format!(
            "blob used size {} exceeds allocated size {}",
            used_size, allocated_size
        )));
    }

    let compression = Compression::from_u8(r.read_u8()?)?;
    let checksum = match r.read_u8()? {
        CHECKSUM_ABSENT => None,
        CHECKSUM_PRESENT => {
            let mut digest = [0u8; 16];
            r.read_exact(&mut digest)?;
            Some(digest)
        }
        v => {
            return Err(Error::Format(format!("invalid checksum flag 0x{:02x}", v)));
        }
    };
    let digest_offset = match checksum {
        Some(_) => r.stream_position()? - 16,
        None => 0,
    };

    // Writers predating the 0..=7 convention may emit 8 filler bytes; skip
    // whatever count is recorded.
    let alignment = r.read_u8()?;
    let mut pad = [0u8; 255];
    r.read_exact(&mut pad[..alignment as usize])?;

    let start = r.stream_position()?;
    Ok(BlobHeader {
        allocated_size,
        used_size,
        data_size,
        compression,
        checksum,
        digest_offset,
        alignment,
        start,
    })
}

/// Read a blob and materialize its logical bytes.
pub(crate) fn read_eager<R: Read + Seek>(r: &mut R) -> Result<Blob> {
    let header = read_header(r)?;
    let mut stored = vec![0u8; header.used_size as usize];
    r.read_exact(&mut stored)?;
    r.seek(SeekFrom::Current(
        (header.allocated_size - header.used_size) as i64,
    ))?;
    let data = header.compression.decompress(&stored)?;
    Ok(Blob::new(data))
}

/// Read a blob header and leave the payload in the file, returning a lazy
/// handle positioned past the allocated region.
pub(crate) fn read_lazy<R: Read + Seek>(r: &mut R) -> Result<Blob> {
    let header = read_header(r)?;
    r.seek(SeekFrom::Start(header.start + header.allocated_size))?;
    Ok(Blob {
        repr: Repr::Lazy(LazyBlob::from_header(header)),
    })
}

/// A file-backed blob handle.
///
/// The handle records where the payload lives; every operation takes the
/// underlying reader or writer explicitly, so the borrow checker enforces
/// that the file is mutated through one path at a time. The cursor is
/// logical (relative to the payload start) and clamped to the used region.
///
/// After editing through [`write`](LazyBlob::write), call
/// [`close`](LazyBlob::close) before discarding the handle: it refreshes
/// the stored MD5 digest when the blob carries one. Without that call the
/// on-disk checksum keeps describing the old payload.
#[derive(Clone, Debug)]
pub struct LazyBlob {
    start: u64,
    used_size: u64,
    allocated_size: u64,
    data_size: u64,
    alignment: u8,
    compression: Compression,
    checksum: Option<[u8; 16]>,
    digest_offset: u64,
    pos: u64,
    dirty: bool,
}

impl LazyBlob {
    fn from_header(h: BlobHeader) -> LazyBlob {
        LazyBlob {
            start: h.start,
            used_size: h.used_size,
            allocated_size: h.allocated_size,
            data_size: h.data_size,
            alignment: h.alignment,
            compression: h.compression,
            checksum: h.checksum,
            digest_offset: h.digest_offset,
            pos: 0,
            dirty: false,
        }
    }

    /// Number of stored payload bytes (post-compression).
    pub fn used_size(&self) -> u64 {
        self.used_size
    }

    /// Number of bytes reserved in the file for this blob.
    pub fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    /// Logical (decompressed) payload size.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum.is_some()
    }

    /// Absolute file offset of the first payload byte.
    pub fn start_offset(&self) -> u64 {
        self.start
    }

    /// Move the cursor. Negative positions are measured from the end of the
    /// used region, so `seek(-2)` addresses the last two bytes.
    pub fn seek(&mut self, p: i64) -> Result<u64> {
        let pos = if p < 0 { self.used_size as i64 + p } else { p };
        if pos < 0 || pos as u64 > self.used_size {
            return Err(Error::Bounds {
                pos,
                used_size: self.used_size,
            });
        }
        self.pos = pos as u64;
        Ok(self.pos)
    }

    /// The cursor position relative to the payload start.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Read `n` bytes at the cursor. Only valid for uncompressed blobs.
    pub fn read<R: Read + Seek>(&mut self, f: &mut R, n: u64) -> Result<Vec<u8>> {
        if self.compression != Compression::None {
            return Err(Error::Unsupported("random access into a compressed blob"));
        }
        if self.pos + n > self.used_size {
            return Err(Error::Bounds {
                pos: (self.pos + n) as i64,
                used_size: self.used_size,
            });
        }
        f.seek(SeekFrom::Start(self.start + self.pos))?;
        let mut buf = vec![0u8; n as usize];
        f.read_exact(&mut buf)?;
        self.pos += n;
        Ok(buf)
    }

    /// Overwrite bytes at the cursor. Only valid for uncompressed blobs in
    /// a file opened for update; writes may not extend past the used size.
    pub fn write<F: Write + Seek>(&mut self, f: &mut F, data: &[u8]) -> Result<()> {
        if self.compression != Compression::None {
            return Err(Error::Unsupported("random access into a compressed blob"));
        }
        let end = self.pos + data.len() as u64;
        if end > self.used_size {
            return Err(Error::Bounds {
                pos: end as i64,
                used_size: self.used_size,
            });
        }
        f.seek(SeekFrom::Start(self.start + self.pos))?;
        f.write_all(data)?;
        self.pos = end;
        self.dirty = true;
        Ok(())
    }

    /// Materialize the full logical payload, decompressing if needed.
    pub fn get_bytes<R: Read + Seek>(&self, f: &mut R) -> Result<Vec<u8>> {
        let stored = self.read_stored(f)?;
        self.compression.decompress(&stored)
    }

    /// Check the stored payload against the embedded checksum. A blob
    /// without a checksum passes trivially.
    pub fn verify<R: Read + Seek>(&self, f: &mut R) -> Result<()> {
        if let Some(expected) = self.checksum {
            let stored = self.read_stored(f)?;
            if md5::compute(&stored).0 != expected {
                return Err(Error::Integrity);
            }
        }
        Ok(())
    }

    /// Refresh the stored checksum if the payload was mutated through this
    /// handle. Must be called before the file is durably closed.
    pub fn close<F: Read + Write + Seek>(&mut self, f: &mut F) -> Result<()> {
        if self.dirty {
            if self.checksum.is_some() {
                let stored = self.read_stored(f)?;
                let digest = md5::compute(&stored);
                f.seek(SeekFrom::Start(self.digest_offset))?;
                f.write_all(&digest.0)?;
                self.checksum = Some(digest.0);
            }
            self.dirty = false;
        }
        Ok(())
    }

    fn read_stored<R: Read + Seek>(&self, f: &mut R) -> Result<Vec<u8>> {
        f.seek(SeekFrom::Start(self.start))?;
        let mut stored = vec![0u8; self.used_size as usize];
        f.read_exact(&mut stored)?;
        Ok(stored)
    }
}
