//! The top-level encoder/decoder driver.

use std::io::{self, Cursor, Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;

use crate::blob;
use crate::compress::Compression;
use crate::error::{Error, Result};
use crate::extension::{Extension, ExtensionRegistry};
use crate::len;
use crate::stream::ListStream;
use crate::tag::{Tag, WireTag};
use crate::value::Value;

/// The four magic bytes opening every BSDF file.
pub const MAGIC: [u8; 4] = *b"BSDF";

/// The (major, minor) format version written to file headers. A reader
/// must refuse a different major version and warn on a higher minor
/// version.
pub const FORMAT_VERSION: (u8, u8) = (2, 0);

/// Nesting limit for containers; the format forbids cycles, so hitting
/// this means pathological input rather than legitimate data.
const MAX_DEPTH: usize = 256;

/// Encoding and decoding options.
///
/// ```
/// use bsdf::{Compression, Options};
///
/// let options = Options::new()
///     .compression(Compression::Zlib)
///     .use_checksum(true);
/// ```
#[derive(Clone, Debug)]
pub struct Options {
    /// Compression for blobs built from raw bytes. Default none.
    pub compression: Compression,
    /// Whether new blobs embed an MD5 checksum. Default false.
    pub use_checksum: bool,
    /// Write floats as 64-bit (default) or 32-bit with precision loss.
    pub float64: bool,
    /// Surface a trailing stream as a [`ListStream`] handle instead of
    /// materializing its elements.
    pub load_streaming: bool,
    /// Surface blobs as lazy file handles instead of materialized bytes.
    pub lazy_blob: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            compression: Compression::None,
            use_checksum: false,
            float64: true,
            load_streaming: false,
            lazy_blob: false,
        }
    }
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    pub fn compression(mut self, c: Compression) -> Options {
        self.compression = c;
        self
    }

    pub fn use_checksum(mut self, on: bool) -> Options {
        self.use_checksum = on;
        self
    }

    pub fn float64(mut self, on: bool) -> Options {
        self.float64 = on;
        self
    }

    pub fn load_streaming(mut self, on: bool) -> Options {
        self.load_streaming = on;
        self
    }

    pub fn lazy_blob(mut self, on: bool) -> Options {
        self.lazy_blob = on;
        self
    }
}

/// A BSDF encoder/decoder: a set of options plus registered extensions.
///
/// For one-off conversions the free functions [`encode`](crate::encode),
/// [`decode`](crate::decode), [`save`](crate::save) and
/// [`load`](crate::load) build a default serializer internally.
pub struct Serializer {
    extensions: ExtensionRegistry,
    options: Options,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// A serializer with default options and the standard extensions.
    pub fn new() -> Serializer {
        Serializer {
            extensions: ExtensionRegistry::standard(),
            options: Options::default(),
        }
    }

    /// A serializer with the given options and the standard extensions.
    pub fn with_options(options: Options) -> Serializer {
        Serializer {
            extensions: ExtensionRegistry::standard(),
            options,
        }
    }

    /// A serializer with the given options and no extensions at all.
    pub fn without_extensions(options: Options) -> Serializer {
        Serializer {
            extensions: ExtensionRegistry::empty(),
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register an extension. Re-registering a name replaces the previous
    /// converter and logs a warning.
    pub fn add_extension(&mut self, ext: Box<dyn Extension>) -> Result<()> {
        self.extensions.add(ext)
    }

    /// Remove an extension by its name.
    pub fn remove_extension(&mut self, name: &str) {
        self.extensions.remove(name)
    }

    /// Encode a value to bytes.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut cur = Cursor::new(Vec::new());
        self.save(&mut cur, value)?;
        Ok(cur.into_inner())
    }

    /// Write the file header and the given root value to `w`.
    ///
    /// If the value contains a [`ListStream`], the stream handle is bound
    /// to `w` and stays usable after this returns; see [`ListStream`].
    pub fn save<W: Write + Seek>(&self, w: &mut W, value: &Value) -> Result<()> {
        w.write_all(&MAGIC)?;
        w.write_u8(FORMAT_VERSION.0)?;
        w.write_u8(FORMAT_VERSION.1)?;

        let mut stream: Option<ListStream> = None;
        self.write_value(w, value, &mut stream, None, 0)?;

        if let Some(ref s) = stream {
            if s.tail_offset() != Some(w.stream_position()?) {
                return Err(Error::Structural(
                    "the stream must be the last object in the file",
                ));
            }
        }
        Ok(())
    }

    /// Decode a value from bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        self.load(&mut Cursor::new(bytes))
    }

    /// Read the file header and the root value from `r`.
    pub fn load<R: Read + Seek>(&self, r: &mut R) -> Result<Value> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::Format("file too short for a BSDF header".to_string())
            }
            _ => Error::Io(e),
        })?;
        if magic != MAGIC {
            return Err(Error::Format(format!(
                "this does not look like a BSDF file (magic {:02x?})",
                magic
            )));
        }

        let major = r.read_u8()?;
        let minor = r.read_u8()?;
        if major != FORMAT_VERSION.0 {
            return Err(Error::Version {
                file: (major, minor),
            });
        }
        if minor > FORMAT_VERSION.1 {
            log::warn!(
                "reading file with higher minor version ({}.{}) than the implementation ({}.{})",
                major,
                minor,
                FORMAT_VERSION.0,
                FORMAT_VERSION.1
            );
        }

        self.read_one(r)
    }

    /// Encode one value without a file header. Used for the root value and
    /// for stream appends, which share the stream slot.
    pub(crate) fn write_one<W: Write + Seek>(
        &self,
        w: &mut W,
        value: &Value,
        stream: &mut Option<ListStream>,
    ) -> Result<()> {
        self.write_value(w, value, stream, None, 0)
    }

    fn write_value<W: Write + Seek>(
        &self,
        w: &mut W,
        value: &Value,
        stream: &mut Option<ListStream>,
        ext_name: Option<&str>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::DepthLimit);
        }
        match *value {
            Value::Null => self.write_tag(w, Tag::Null, ext_name)?,
            Value::Bool(true) => self.write_tag(w, Tag::True, ext_name)?,
            Value::Bool(false) => self.write_tag(w, Tag::False, ext_name)?,
            Value::Int(v) => {
                if (-32768..=32767).contains(&v) {
                    self.write_tag(w, Tag::Int16, ext_name)?;
                    w.write_i16::<LittleEndian>(v as i16)?;
                } else {
                    self.write_tag(w, Tag::Int64, ext_name)?;
                    w.write_i64::<LittleEndian>(v)?;
                }
            }
            Value::F32(v) => {
                self.write_tag(w, Tag::Float32, ext_name)?;
                w.write_f32::<LittleEndian>(v)?;
            }
            Value::F64(v) => {
                if self.options.float64 {
                    self.write_tag(w, Tag::Float64, ext_name)?;
                    w.write_f64::<LittleEndian>(v)?;
                } else {
                    self.write_tag(w, Tag::Float32, ext_name)?;
                    w.write_f32::<LittleEndian>(v as f32)?;
                }
            }
            Value::Str(ref v) => {
                self.write_tag(w, Tag::Str, ext_name)?;
                len::write_len(w, v.len() as u64)?;
                w.write_all(v.as_bytes())?;
            }
            Value::Blob(ref v) => {
                self.write_tag(w, Tag::Blob, ext_name)?;
                v.write(w, self.options.compression, self.options.use_checksum)?;
            }
            Value::List(ref items) => {
                self.write_tag(w, Tag::List, ext_name)?;
                len::write_len(w, items.len() as u64)?;
                for item in items {
                    self.write_value(w, item, stream, None, depth + 1)?;
                }
            }
            Value::Map(ref map) => {
                self.write_tag(w, Tag::Map, ext_name)?;
                len::write_len(w, map.len() as u64)?;
                for (key, item) in map {
                    if key.is_empty() {
                        return Err(Error::Encoding("map keys must be non-empty".to_string()));
                    }
                    len::write_len(w, key.len() as u64)?;
                    w.write_all(key.as_bytes())?;
                    self.write_value(w, item, stream, None, depth + 1)?;
                }
            }
            Value::Stream(ref s) => {
                if stream.is_some() {
                    return Err(Error::Structural("can only have one stream per file"));
                }
                self.write_tag(w, Tag::List, ext_name)?;
                w.write_u8(len::OPEN_STREAM)?;
                w.write_u64::<LittleEndian>(0)?;
                s.bind(w.stream_position()? - 8)?;
                *stream = Some(s.clone());
            }
            Value::Ext(ref name, ref inner) => {
                if ext_name.is_some() {
                    return Err(Error::Encoding(
                        "extension wrappers cannot be nested directly".to_string(),
                    ));
                }
                if matches!(**inner, Value::Ext(..) | Value::Custom(..)) {
                    return Err(Error::Encoding(
                        "extension wrapper must contain a base value".to_string(),
                    ));
                }
                self.write_value(w, inner, stream, Some(name.as_str()), depth)?;
            }
            Value::Custom(ref custom) => {
                let ext = self
                    .extensions
                    .select(custom.as_ref())
                    .ok_or_else(|| Error::NotEncodable(custom.type_name().to_string()))?;
                if ext_name == Some(ext.name()) {
                    return Err(Error::ExtensionRecursion(ext.name().to_string()));
                }
                let base = ext.to_base(custom.as_ref())?;
                self.write_value(w, &base, stream, Some(ext.name()), depth + 1)?;
            }
        }
        Ok(())
    }

    /// Write a type tag, uppercased and followed by the extension name when
    /// one applies.
    fn write_tag<W: Write>(&self, w: &mut W, tag: Tag, ext_name: Option<&str>) -> Result<()> {
        match ext_name {
            None => w.write_u8(tag.into_u8())?,
            Some(name) => {
                if name.is_empty() || name.len() > 250 {
                    return Err(Error::Encoding(format!(
                        "extension name must be 1-250 bytes, got {:?}",
                        name
                    )));
                }
                w.write_u8(tag.into_u8().to_ascii_uppercase())?;
                len::write_len(w, name.len() as u64)?;
                w.write_all(name.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Decode one value, assuming the cursor is at a tag byte.
    pub(crate) fn read_one<R: Read + Seek>(&self, r: &mut R) -> Result<Value> {
        let tag = r.read_u8()?;
        self.read_value(r, tag, 0)
    }

    /// Like [`read_one`](Serializer::read_one), but end-of-file at the tag
    /// boundary yields `None` instead of an error. Open streams terminate
    /// this way.
    pub(crate) fn read_one_opt<R: Read + Seek>(&self, r: &mut R) -> Result<Option<Value>> {
        let mut tag = [0u8; 1];
        match r.read_exact(&mut tag) {
            Ok(()) => self.read_value(r, tag[0], 0).map(Some),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read_nested<R: Read + Seek>(&self, r: &mut R, depth: usize) -> Result<Value> {
        let tag = r.read_u8()?;
        self.read_value(r, tag, depth + 1)
    }

    fn read_value<R: Read + Seek>(&self, r: &mut R, tag_byte: u8, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(Error::DepthLimit);
        }
        let wire = WireTag::parse(tag_byte)?;

        let ext_name = if wire.extended {
            let n = len::read_len(r)?;
            if n == 0 || n > 250 {
                return Err(Error::Format(format!("invalid extension name length {}", n)));
            }
            let mut buf = vec![0u8; n as usize];
            r.read_exact(&mut buf)?;
            Some(String::from_utf8(buf).map_err(|_| {
                Error::Encoding("extension name is not valid UTF-8".to_string())
            })?)
        } else {
            None
        };

        let value = match wire.tag {
            Tag::Null => Value::Null,
            Tag::True => Value::Bool(true),
            Tag::False => Value::Bool(false),
            Tag::Int16 => Value::Int(r.read_i16::<LittleEndian>()? as i64),
            Tag::Int64 => Value::Int(r.read_i64::<LittleEndian>()?),
            Tag::Float32 => Value::F32(r.read_f32::<LittleEndian>()?),
            Tag::Float64 => Value::F64(r.read_f64::<LittleEndian>()?),
            Tag::Str => {
                let n = len::read_len(r)?;
                let mut buf = vec![0u8; n as usize];
                r.read_exact(&mut buf)?;
                Value::Str(String::from_utf8(buf).map_err(|_| {
                    Error::Encoding("string is not valid UTF-8".to_string())
                })?)
            }
            Tag::List => self.read_list(r, depth)?,
            Tag::Map => {
                let n = len::read_len(r)?;
                let mut map = IndexMap::new();
                for _ in 0..n {
                    let klen = len::read_len(r)?;
                    if klen == 0 {
                        return Err(Error::Format("empty map key".to_string()));
                    }
                    let mut kbuf = vec![0u8; klen as usize];
                    r.read_exact(&mut kbuf)?;
                    let key = String::from_utf8(kbuf).map_err(|_| {
                        Error::Encoding("map key is not valid UTF-8".to_string())
                    })?;
                    let item = self.read_nested(r, depth)?;
                    // Duplicate keys are undefined in the format; last wins.
                    map.insert(key, item);
                }
                Value::Map(map)
            }
            Tag::Blob => {
                if self.options.lazy_blob {
                    Value::Blob(blob::read_lazy(r)?)
                } else {
                    Value::Blob(blob::read_eager(r)?)
                }
            }
        };

        match ext_name {
            Some(name) => match self.extensions.get(&name) {
                Some(ext) => ext.from_base(value),
                None => {
                    log::warn!("no extension registered for {:?}, returning base value", name);
                    Ok(value)
                }
            },
            None => Ok(value),
        }
    }

    /// List payloads: a plain length-prefixed list, or the stream form
    /// marked by `254`/`255` plus an 8-byte count.
    fn read_list<R: Read + Seek>(&self, r: &mut R, depth: usize) -> Result<Value> {
        let first = r.read_u8()?;
        let exact = match first {
            0..=250 => Some(first as u64),
            253 => Some(r.read_u64::<LittleEndian>()?),
            len::CLOSED_STREAM | len::OPEN_STREAM => {
                let count = r.read_u64::<LittleEndian>()?;
                // An open stream with a nonzero count was finalized without
                // the closed marker; trust the count either way.
                let remaining = if first == len::CLOSED_STREAM || count > 0 {
                    Some(count)
                } else {
                    None
                };
                if self.options.load_streaming {
                    return Ok(Value::Stream(ListStream::reading(remaining)));
                }
                remaining
            }
            _ => return Err(Error::Format(format!("unknown size marker {}", first))),
        };

        let mut items = Vec::new();
        match exact {
            Some(n) => {
                for _ in 0..n {
                    items.push(self.read_nested(r, depth)?);
                }
            }
            None => loop {
                let mut tag = [0u8; 1];
                match r.read_exact(&mut tag) {
                    Ok(()) => items.push(self.read_value(r, tag[0], depth + 1)?),
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(Error::Io(e)),
                }
            },
        }
        Ok(Value::List(items))
    }
}
