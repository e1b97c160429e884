//! Serde serialization of [`Value`], so BSDF values can be fed to any
//! serde-based format. Only base values serialize; streams, lazy blobs,
//! and custom values need the BSDF encoder proper.

use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::value::Value;

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match *self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(v),
            Value::Int(v) => serializer.serialize_i64(v),
            Value::F32(v) => serializer.serialize_f32(v),
            Value::F64(v) => serializer.serialize_f64(v),
            Value::Str(ref v) => serializer.serialize_str(v),
            Value::Blob(ref v) => match v.bytes() {
                Some(bytes) => serde_bytes::Bytes::new(bytes).serialize(serializer),
                None => Err(S::Error::custom(
                    "lazy blobs cannot be serialized outside the BSDF encoder",
                )),
            },
            Value::List(ref items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(ref map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (key, item) in map {
                    m.serialize_entry(key, item)?;
                }
                m.end()
            }
            Value::Stream(_) => Err(S::Error::custom(
                "streams cannot be serialized outside the BSDF encoder",
            )),
            Value::Ext(_, ref inner) => inner.serialize(serializer),
            Value::Custom(_) => Err(S::Error::custom(
                "custom values cannot be serialized outside the BSDF encoder",
            )),
        }
    }
}
