//! The value model that the format transports.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;

use crate::blob::Blob;
use crate::stream::ListStream;

/// A BSDF value.
///
/// A file contains exactly one root `Value`. Maps preserve insertion order
/// through a round trip, which is why they are backed by [`IndexMap`].
/// Integers must fit in 64 signed bits; the encoder picks the 2-byte or
/// 8-byte wire form by range. The `F32`/`F64` split mirrors the two float
/// wire forms, so a decoded value re-encodes at the same precision.
#[derive(Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Blob(Blob),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// A list whose length is not known when its header is written. At most
    /// one per file, and it must be the last object encoded.
    Stream(ListStream),
    /// An explicit extension wrapper: the inner value is encoded with an
    /// uppercased tag carrying the name. The inner value must be a base
    /// value, not another wrapper.
    Ext(String, Box<Value>),
    /// A user value that is not a base type; the encoder routes it through
    /// the extension registry.
    Custom(Box<dyn Custom>),
}

/// A user value that can be carried in [`Value::Custom`] and translated to
/// base values by a registered [`Extension`](crate::Extension).
///
/// The object-safe clone/equality hooks keep `Value` itself `Clone` and
/// `PartialEq` without constraining implementors beyond `Any + Debug`.
pub trait Custom: Any + fmt::Debug {
    /// The concrete type name, used in "not encodable" diagnostics.
    fn type_name(&self) -> &'static str;

    /// Clone into a fresh boxed trait object.
    fn clone_boxed(&self) -> Box<dyn Custom>;

    /// Equality against another custom value of possibly different type.
    fn eq_boxed(&self, other: &dyn Custom) -> bool;

    /// Upcast for downcasting and `TypeId` dispatch.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Value {
    fn clone(&self) -> Value {
        match *self {
            Value::Null => Value::Null,
            Value::Bool(v) => Value::Bool(v),
            Value::Int(v) => Value::Int(v),
            Value::F32(v) => Value::F32(v),
            Value::F64(v) => Value::F64(v),
            Value::Str(ref v) => Value::Str(v.clone()),
            Value::Blob(ref v) => Value::Blob(v.clone()),
            Value::List(ref v) => Value::List(v.clone()),
            Value::Map(ref v) => Value::Map(v.clone()),
            Value::Stream(ref v) => Value::Stream(v.clone()),
            Value::Ext(ref name, ref v) => Value::Ext(name.clone(), v.clone()),
            Value::Custom(ref v) => Value::Custom(v.clone_boxed()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Bit-pattern equality, so NaN compares equal to itself after a
            // round trip.
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Stream(a), Value::Stream(b)) => a.same_handle(b),
            (Value::Ext(an, av), Value::Ext(bn, bv)) => an == bn && av == bv,
            (Value::Custom(a), Value::Custom(b)) => a.eq_boxed(b.as_ref()),
            _ => false,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(*self, Value::Null)
    }

    pub fn is_int(&self) -> bool {
        self.as_i64().is_some()
    }

    pub fn is_str(&self) -> bool {
        self.as_str().is_some()
    }

    pub fn is_list(&self) -> bool {
        self.as_list().is_some()
    }

    pub fn is_map(&self) -> bool {
        self.as_map().is_some()
    }

    pub fn is_blob(&self) -> bool {
        self.as_blob().is_some()
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        if let Value::Int(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Numeric view: integers and both float widths.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(v) => Some(v as f64),
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::Str(ref v) = *self {
            Some(v.as_str())
        } else {
            None
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        if let Value::Blob(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_blob_mut(&mut self) -> Option<&mut Blob> {
        if let Value::Blob(ref mut v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// The logical bytes of an in-memory blob.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.as_blob().and_then(|b| b.bytes())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(ref v) = *self {
            Some(v.as_slice())
        } else {
            None
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        if let Value::List(ref mut v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        if let Value::Map(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        if let Value::Map(ref mut v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_stream(&self) -> Option<&ListStream> {
        if let Value::Stream(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Downcast a custom value to its concrete type.
    pub fn as_custom<T: Custom>(&self) -> Option<&T> {
        if let Value::Custom(ref v) = *self {
            v.as_any().downcast_ref::<T>()
        } else {
            None
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Value {
        Value::Int(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Blob(Blob::new(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Value {
        Value::Blob(Blob::new(v.to_vec()))
    }
}

impl From<Blob> for Value {
    fn from(v: Blob) -> Value {
        Value::Blob(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Value {
        Value::Map(v)
    }
}

impl From<ListStream> for Value {
    fn from(v: ListStream) -> Value {
        Value::Stream(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(3i32).as_i64(), Some(3));
        assert_eq!(Value::from(3i32).as_f64(), Some(3.0));
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::from(2.5f64).as_f64(), Some(2.5));
        assert!(Value::from(vec![1u8, 2]).is_blob());
        assert_eq!(Value::from(vec![1u8, 2]).as_bytes(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn nan_compares_equal_by_bits() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert_ne!(Value::F64(1.0), Value::F64(2.0));
        assert_ne!(Value::F64(1.0), Value::Int(1));
    }

    #[test]
    fn map_equality_respects_order() {
        let mut a = IndexMap::new();
        a.insert("x".to_string(), Value::from(1i32));
        a.insert("y".to_string(), Value::from(2i32));
        let mut b = IndexMap::new();
        b.insert("y".to_string(), Value::from(2i32));
        b.insert("x".to_string(), Value::from(1i32));
        assert_ne!(Value::Map(a), Value::Map(b));
    }
}
