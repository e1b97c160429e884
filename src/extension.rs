//! Named extensions that layer user types onto base values.
//!
//! On the wire an extension is an uppercased type tag followed by a
//! length-prefixed name; the payload is structurally identical to the
//! lowercase form. A decoder that does not know the name keeps the base
//! value and logs a warning, so extended data stays readable everywhere.

use std::any::TypeId;
use std::collections::HashMap;

use indexmap::IndexMap;

use crate::blob::Blob;
use crate::error::{Error, Result};
use crate::value::{Custom, Value};

/// A named converter between a user type and base values.
///
/// `to_base` runs when the encoder meets a [`Value::Custom`] this extension
/// accepts; `from_base` runs when the decoder meets the extension's name.
pub trait Extension {
    /// The wire name, 1 to 250 UTF-8 bytes.
    fn name(&self) -> &str;

    /// The concrete type this extension encodes, for fast dispatch. An
    /// extension matching several types can return `None` and rely on
    /// [`matches`](Extension::matches).
    fn kind(&self) -> Option<TypeId> {
        None
    }

    /// Whether this extension can convert the given value. The default
    /// accepts exactly the [`kind`](Extension::kind) type.
    fn matches(&self, value: &dyn Custom) -> bool {
        self.kind() == Some(value.as_any().type_id())
    }

    /// Convert a user value to base values.
    fn to_base(&self, value: &dyn Custom) -> Result<Value>;

    /// Convert decoded base values back to the user representation.
    fn from_base(&self, value: Value) -> Result<Value>;
}

/// The set of registered extensions, with a type-keyed fast path for
/// encoding and the registration order preserved for `matches` scans.
pub(crate) struct ExtensionRegistry {
    by_name: IndexMap<String, Box<dyn Extension>>,
    by_kind: HashMap<TypeId, String>,
}

impl ExtensionRegistry {
    pub fn empty() -> ExtensionRegistry {
        ExtensionRegistry {
            by_name: IndexMap::new(),
            by_kind: HashMap::new(),
        }
    }

    /// The standard extensions shipped with the format.
    pub fn standard() -> ExtensionRegistry {
        let mut registry = ExtensionRegistry::empty();
        // Names are known-valid, so registration cannot fail here.
        let _ = registry.add(Box::new(ComplexExtension));
        let _ = registry.add(Box::new(NdArrayExtension));
        registry
    }

    /// Register an extension. Re-registering a name replaces the previous
    /// converter and logs a warning.
    pub fn add(&mut self, ext: Box<dyn Extension>) -> Result<()> {
        let name = ext.name().to_string();
        if name.is_empty() || name.len() > 250 {
            return Err(Error::Encoding(format!(
                "extension name must be 1-250 bytes, got {:?}",
                name
            )));
        }
        if self.by_name.contains_key(&name) {
            log::warn!("overwriting extension {:?}; consider removing it first", name);
            self.remove(&name);
        }
        if let Some(kind) = ext.kind() {
            self.by_kind.insert(kind, name.clone());
        }
        self.by_name.insert(name, ext);
        Ok(())
    }

    /// Remove an extension by name.
    pub fn remove(&mut self, name: &str) {
        self.by_name.shift_remove(name);
        self.by_kind.retain(|_, v| v != name);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Extension> {
        self.by_name.get(name).map(|e| e.as_ref())
    }

    /// Select the extension for a custom value: exact type first, then a
    /// `matches` scan in registration order.
    pub fn select(&self, value: &dyn Custom) -> Option<&dyn Extension> {
        if let Some(name) = self.by_kind.get(&value.as_any().type_id()) {
            if let Some(ext) = self.by_name.get(name) {
                return Some(ext.as_ref());
            }
        }
        self.by_name
            .values()
            .map(|e| e.as_ref())
            .find(|e| e.matches(value))
    }
}

/// A complex number, carried over the wire as a two-element list
/// `[real, imag]` under the extension name `c`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Complex {
        Complex { re, im }
    }
}

impl Custom for Complex {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Complex>()
    }

    fn clone_boxed(&self) -> Box<dyn Custom> {
        Box::new(*self)
    }

    fn eq_boxed(&self, other: &dyn Custom) -> bool {
        other
            .as_any()
            .downcast_ref::<Complex>()
            .map_or(false, |o| o == self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<Complex> for Value {
    fn from(v: Complex) -> Value {
        Value::Custom(Box::new(v))
    }
}

/// The standard `c` extension.
pub struct ComplexExtension;

impl Extension for ComplexExtension {
    fn name(&self) -> &str {
        "c"
    }

    fn kind(&self) -> Option<TypeId> {
        Some(TypeId::of::<Complex>())
    }

    fn to_base(&self, value: &dyn Custom) -> Result<Value> {
        let c = value
            .as_any()
            .downcast_ref::<Complex>()
            .ok_or_else(|| Error::NotEncodable(value.type_name().to_string()))?;
        Ok(Value::List(vec![Value::F64(c.re), Value::F64(c.im)]))
    }

    fn from_base(&self, value: Value) -> Result<Value> {
        let parts = value
            .as_list()
            .filter(|l| l.len() == 2)
            .ok_or_else(|| Error::Encoding("complex value must be a [re, im] list".into()))?;
        let re = parts[0]
            .as_f64()
            .ok_or_else(|| Error::Encoding("complex parts must be numbers".into()))?;
        let im = parts[1]
            .as_f64()
            .ok_or_else(|| Error::Encoding("complex parts must be numbers".into()))?;
        Ok(Complex::new(re, im).into())
    }
}

/// An n-dimensional array: a shape, an element type name, and the raw
/// element bytes. Carried over the wire as a map `{shape, dtype, data}`
/// under the extension name `ndarray`. The `dtype` string is opaque to
/// this crate.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    pub shape: Vec<u64>,
    pub dtype: String,
    pub data: Vec<u8>,
}

impl Custom for NdArray {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<NdArray>()
    }

    fn clone_boxed(&self) -> Box<dyn Custom> {
        Box::new(self.clone())
    }

    fn eq_boxed(&self, other: &dyn Custom) -> bool {
        other
            .as_any()
            .downcast_ref::<NdArray>()
            .map_or(false, |o| o == self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Value {
        Value::Custom(Box::new(v))
    }
}

/// The standard `ndarray` extension.
pub struct NdArrayExtension;

impl Extension for NdArrayExtension {
    fn name(&self) -> &str {
        "ndarray"
    }

    fn kind(&self) -> Option<TypeId> {
        Some(TypeId::of::<NdArray>())
    }

    fn to_base(&self, value: &dyn Custom) -> Result<Value> {
        let a = value
            .as_any()
            .downcast_ref::<NdArray>()
            .ok_or_else(|| Error::NotEncodable(value.type_name().to_string()))?;
        let mut map = IndexMap::new();
        map.insert(
            "shape".to_string(),
            Value::List(a.shape.iter().map(|&n| Value::Int(n as i64)).collect()),
        );
        map.insert("dtype".to_string(), Value::Str(a.dtype.clone()));
        map.insert("data".to_string(), Value::Blob(Blob::new(a.data.clone())));
        Ok(Value::Map(map))
    }

    fn from_base(&self, value: Value) -> Result<Value> {
        let bad = || Error::Encoding("ndarray value must be a {shape, dtype, data} map".into());
        let map = value.as_map().ok_or_else(bad)?;
        let shape = map
            .get("shape")
            .and_then(Value::as_list)
            .ok_or_else(bad)?
            .iter()
            .map(|v| v.as_i64().filter(|&n| n >= 0).map(|n| n as u64))
            .collect::<Option<Vec<u64>>>()
            .ok_or_else(bad)?;
        let dtype = map.get("dtype").and_then(Value::as_str).ok_or_else(bad)?;
        let data = map.get("data").and_then(Value::as_bytes).ok_or_else(bad)?;
        Ok(NdArray {
            shape,
            dtype: dtype.to_string(),
            data: data.to_vec(),
        }
        .into())
    }
}
