use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{BoxError, ConvertError};
use crate::reflect::{
    AssignSource, Kind, Number, Reflect, ReflectMut, ReflectRef, ScanTarget, TypeInfo, Typed,
    intern,
};

/// Loosely typed value: decoded JSON, form fields, configuration.
///
/// As a source the engine dispatches on the payload at runtime. As a
/// destination every source shape can be rendered into it:
/// - numbers keep their signedness (`Int`, `Uint`, `Float`)
/// - structs become maps keyed by resolved field name
/// - null pointers become `Null`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Never produced by deserialization; JSON arrays decode as `Array`.
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Entry of a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Render any reflected value into its dynamic shape.
    ///
    /// Nested values go through `engine`, so hooks apply at every level.
    pub fn render(engine: &Engine, src: &dyn Reflect) -> Result<Value, ConvertError> {
        let mut out = Value::Null;
        engine.dispatch(&mut out, src)?;
        Ok(out)
    }

    /// [`Value::render`] on the global engine.
    pub fn from_reflect(src: &dyn Reflect) -> Result<Value, ConvertError> {
        Self::render(Engine::global(), src)
    }
}

impl Typed for Value {
    fn type_info() -> &'static TypeInfo {
        intern::<Self>(|| TypeInfo::new::<Self>(Kind::Dynamic))
    }
}

impl Reflect for Value {
    crate::reflect_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        let payload: Option<&dyn Reflect> = match self {
            Value::Null => None,
            Value::Bool(v) => Some(v),
            Value::Int(v) => Some(v),
            Value::Uint(v) => Some(v),
            Value::Float(v) => Some(v),
            Value::String(v) => Some(v),
            Value::Array(v) => Some(v),
            Value::Map(v) => Some(v),
            Value::Bytes(v) => Some(v),
        };
        ReflectRef::Dynamic(payload)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Dynamic(self)
    }
}

// ════════════════════════════════════════════════════════════════
//  Conversions
// ════════════════════════════════════════════════════════════════

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        if let Some(v) = n.signed() {
            Value::Int(v)
        } else if let Some(v) = n.unsigned() {
            Value::Uint(v)
        } else {
            Value::Float(n.to_f64())
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        }
    )*};
}

value_from! {
    bool => Bool,
    i8 => Int, i16 => Int, i32 => Int, i64 => Int,
    u8 => Uint, u16 => Uint, u32 => Uint, u64 => Uint,
    f32 => Float, f64 => Float,
    String => String, &str => String,
    Vec<Value> => Array,
    BTreeMap<String, Value> => Map,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ════════════════════════════════════════════════════════════════
//  RawJson
// ════════════════════════════════════════════════════════════════

/// An undecoded JSON document.
///
/// As a source it decodes itself and converts the result into the
/// destination. As a destination it encodes whatever it is given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawJson(pub String);

impl RawJson {
    pub fn new(json: impl Into<String>) -> Self {
        Self(json.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Typed for RawJson {
    fn type_info() -> &'static TypeInfo {
        intern::<Self>(|| {
            TypeInfo::new::<Self>(Kind::Opaque)
                .with_scan()
                .with_assign_to()
        })
    }
}

impl Reflect for RawJson {
    crate::reflect_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Opaque
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Opaque
    }

    fn as_scan_target(&mut self) -> Option<&mut dyn ScanTarget> {
        Some(self)
    }

    fn as_assign_source(&self) -> Option<&dyn AssignSource> {
        Some(self)
    }
}

impl AssignSource for RawJson {
    fn assign_to(&self, engine: &Engine, dst: &mut dyn Reflect) -> Result<(), ConvertError> {
        let decoded: Value = serde_json::from_str(&self.0)?;
        engine.assign(dst, &decoded)
    }
}

impl ScanTarget for RawJson {
    fn scan(&mut self, src: &dyn Reflect) -> Result<(), BoxError> {
        let value = Value::from_reflect(src)?;
        self.0 = serde_json::to_string(&value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_untagged_json() {
        let v: Value = serde_json::from_str(r#"{"a":1,"b":[true,null],"c":1.5,"d":18446744073709551615}"#)
            .unwrap();
        let expected: Value = [
            ("a", Value::Int(1)),
            ("b", Value::Array(vec![Value::Bool(true), Value::Null])),
            ("c", Value::Float(1.5)),
            ("d", Value::Uint(u64::MAX)),
        ]
        .into_iter()
        .collect();
        assert_eq!(v, expected);
    }

    #[test]
    fn from_serde_json_matches_direct_decode() {
        let text = r#"{"name":"x","tags":["a","b"],"n":-3}"#;
        let via_json: serde_json::Value = serde_json::from_str(text).unwrap();
        let direct: Value = serde_json::from_str(text).unwrap();
        assert_eq!(Value::from(via_json), direct);
    }

    #[test]
    fn null_has_no_payload() {
        assert!(matches!(Value::Null.reflect_ref(), ReflectRef::Dynamic(None)));
        assert!(matches!(
            Value::Int(3).reflect_ref(),
            ReflectRef::Dynamic(Some(_))
        ));
    }

    #[test]
    fn renders_containers_and_pointers() {
        let mut map = BTreeMap::new();
        map.insert(7u32, vec![Some(1i8), None]);
        let rendered = Value::from_reflect(&map).unwrap();
        let expected: Value = [(
            "7",
            Value::Array(vec![Value::Int(1), Value::Null]),
        )]
        .into_iter()
        .collect();
        assert_eq!(rendered, expected);
    }

    #[test]
    fn rendering_reaches_hooks_behind_pointers() {
        let rendered = Value::from_reflect(&Some(RawJson::new("[1]"))).unwrap();
        assert_eq!(rendered, Value::Array(vec![Value::Int(1)]));

        let docs = vec![RawJson::new(r#"{"a":true}"#), RawJson::new("null")];
        let rendered = Value::from_reflect(&docs).unwrap();
        let expected = Value::Array(vec![
            [("a", Value::Bool(true))].into_iter().collect(),
            Value::Null,
        ]);
        assert_eq!(rendered, expected);
    }

    #[test]
    fn raw_json_scans_any_source() {
        let mut raw = RawJson::default();
        raw.scan(&vec![1u16, 2]).unwrap();
        assert_eq!(raw.as_str(), "[1,2]");
    }
}
