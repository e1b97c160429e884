//! Streamed lists: lists whose length is not known when their header is
//! written.
//!
//! The encoder emits the list tag, the open-stream marker `255`, and an
//! 8-byte count of zero, then records the absolute offset of that count
//! field in the stream handle. The handle stays usable after
//! [`save`](crate::Serializer::save) returns: `append` writes elements at
//! the end of the file, and `close` rewrites the header with the final
//! count and the closed-stream marker `254`. Without a `close` the count
//! stays zero and readers treat the stream as open, consuming elements
//! until the end of the file.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::len;
use crate::serializer::Serializer;
use crate::value::Value;

/// A streamable list, used for writing or reading.
///
/// The handle is cheap to clone; clones share state. Every operation takes
/// the underlying file and the serializer explicitly, matching the
/// single-mutator contract of the format.
#[derive(Clone, Debug)]
pub struct ListStream {
    inner: Rc<RefCell<State>>,
}

#[derive(Debug)]
enum State {
    /// Created but not yet encoded into a file.
    Unbound,
    /// Bound to a file; elements may be appended.
    Active { count_offset: u64, count: u64 },
    /// Header rewritten with a final count. Appending reopens the stream.
    Closed { count_offset: u64, count: u64 },
    /// No further appends or closes.
    HardClosed,
    /// Read side: `remaining` is `None` for an open stream (elements until
    /// end of file) or the number of elements left to yield.
    Reading { remaining: Option<u64> },
}

impl Default for ListStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ListStream {
    /// Create a stream for writing. Hand it to the serializer as the last
    /// value of the structure, then `append`/`close` against the same file.
    pub fn new() -> ListStream {
        ListStream {
            inner: Rc::new(RefCell::new(State::Unbound)),
        }
    }

    /// Read-side handle, positioned at the first element.
    pub(crate) fn reading(remaining: Option<u64>) -> ListStream {
        ListStream {
            inner: Rc::new(RefCell::new(State::Reading { remaining })),
        }
    }

    /// Bind to a file during encoding. A handle binds once; reusing it in a
    /// second encode is an error.
    pub(crate) fn bind(&self, count_offset: u64) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        match *state {
            State::Unbound => {
                *state = State::Active {
                    count_offset,
                    count: 0,
                };
                Ok(())
            }
            _ => Err(Error::Structural(
                "a stream handle cannot be used in more than one encode",
            )),
        }
    }

    /// File offset one past the count field, used to verify the stream is
    /// the last object in the file.
    pub(crate) fn tail_offset(&self) -> Option<u64> {
        match *self.inner.borrow() {
            State::Active { count_offset, .. } | State::Closed { count_offset, .. } => {
                Some(count_offset + 8)
            }
            _ => None,
        }
    }

    /// Elements appended so far through this handle.
    pub fn count(&self) -> u64 {
        match *self.inner.borrow() {
            State::Active { count, .. } | State::Closed { count, .. } => count,
            _ => 0,
        }
    }

    /// Append an element at the end of the file.
    ///
    /// Appending to a softly closed stream reopens its header (marker back
    /// to `255`, count back to zero) so that readers fall back to
    /// end-of-file iteration until the stream is closed again.
    pub fn append<W: Write + Seek>(&self, ser: &Serializer, w: &mut W, value: &Value) -> Result<()> {
        {
            let mut state = self.inner.borrow_mut();
            match *state {
                State::Active { .. } => {
                    w.seek(SeekFrom::End(0))?;
                }
                State::Closed {
                    count_offset,
                    count,
                } => {
                    w.seek(SeekFrom::Start(count_offset - 1))?;
                    w.write_u8(len::OPEN_STREAM)?;
                    w.write_u64::<LittleEndian>(0)?;
                    w.seek(SeekFrom::End(0))?;
                    *state = State::Active {
                        count_offset,
                        count,
                    };
                }
                State::Unbound => {
                    return Err(Error::Structural("stream is not bound to a file yet"));
                }
                State::HardClosed => {
                    return Err(Error::Structural("stream is closed"));
                }
                State::Reading { .. } => {
                    return Err(Error::Structural("stream is read-only"));
                }
            }
        }

        // The slot already holds this stream, so a nested stream in the
        // appended value trips the one-stream-per-file check.
        let mut slot = Some(self.clone());
        ser.write_one(w, value, &mut slot)?;

        if let State::Active { ref mut count, .. } = *self.inner.borrow_mut() {
            *count += 1;
        }
        Ok(())
    }

    /// Rewrite the header with the final count and the closed-stream
    /// marker, restoring the file cursor afterwards. Idempotent.
    pub fn close<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        self.close_inner(w, false)
    }

    /// Like [`close`](ListStream::close), but further appends are refused.
    pub fn close_hard<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        self.close_inner(w, true)
    }

    fn close_inner<W: Write + Seek>(&self, w: &mut W, hard: bool) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        match *state {
            State::Active {
                count_offset,
                count,
            }
            | State::Closed {
                count_offset,
                count,
            } => {
                let pos = w.stream_position()?;
                w.seek(SeekFrom::Start(count_offset - 1))?;
                w.write_u8(len::CLOSED_STREAM)?;
                w.write_u64::<LittleEndian>(count)?;
                w.seek(SeekFrom::Start(pos))?;
                *state = if hard {
                    State::HardClosed
                } else {
                    State::Closed {
                        count_offset,
                        count,
                    }
                };
                Ok(())
            }
            State::Unbound => Err(Error::Structural("stream is not bound to a file yet")),
            State::HardClosed => Err(Error::Structural("stream is closed")),
            State::Reading { .. } => Err(Error::Structural("stream is read-only")),
        }
    }

    /// Read the next element, or `None` when the stream is exhausted. For
    /// an open stream, exhaustion is the end of the file at an element
    /// boundary; mid-element truncation is still an error.
    pub fn next<R: Read + Seek>(&self, ser: &Serializer, r: &mut R) -> Result<Option<Value>> {
        let remaining = match *self.inner.borrow() {
            State::Reading { remaining } => remaining,
            _ => return Err(Error::Structural("stream is write-only")),
        };
        match remaining {
            Some(0) => Ok(None),
            Some(n) => {
                let value = ser.read_one(r)?;
                *self.inner.borrow_mut() = State::Reading {
                    remaining: Some(n - 1),
                };
                Ok(Some(value))
            }
            None => ser.read_one_opt(r),
        }
    }

    /// Whether two handles refer to the same stream.
    pub fn same_handle(&self, other: &ListStream) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
