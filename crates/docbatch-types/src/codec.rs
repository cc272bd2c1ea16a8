//! Extended-JSON serialization.
//!
//! Plain JSON cannot tell a canonical id from a string once it has been
//! written out, so ids are encoded as `{"$oid": "<hex>"}` and non-finite
//! floats as `{"$numberDouble": "NaN" | "Infinity" | "-Infinity"}`. Decoding
//! turns those single-key wrappers back into the typed values. Everything
//! else maps onto ordinary JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeResult;
use crate::object_id::ObjectId;
use crate::value::{Document, Value};

const OID_KEY: &str = "$oid";
const DOUBLE_KEY: &str = "$numberDouble";

/// Encode any serializable value as an extended-JSON string.
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> TypeResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode an extended-JSON string.
pub fn from_str<T: DeserializeOwned>(s: &str) -> TypeResult<T> {
    Ok(serde_json::from_str(s)?)
}

/// Deterministic encoding used for equality of composite values.
///
/// Object keys are already ordered, so the output is canonical.
pub(crate) fn to_canonical_string(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(OID_KEY, &self.to_hex())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::ObjectId(id) => Ok(id),
            Value::String(s) => ObjectId::from_hex(&s).map_err(de::Error::custom),
            other => Err(de::Error::custom(format!("expected object id, got {other}"))),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) if x.is_finite() => serializer.serialize_f64(*x),
            Self::Float(x) => {
                let repr = if x.is_nan() {
                    "NaN"
                } else if x.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(DOUBLE_KEY, repr)?;
                map.end()
            }
            Self::String(s) => serializer.serialize_str(s),
            Self::ObjectId(id) => id.serialize(serializer),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => fields.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an extended-JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Value, E> {
        Ok(Value::Int(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Value, E> {
        Ok(i64::try_from(u).map_or(Value::Float(u as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<Value, E> {
        Ok(Value::Float(x))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut fields = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            fields.insert(key, value);
        }
        Ok(unwrap_extended(fields))
    }
}

/// Turn `{"$oid": ..}` / `{"$numberDouble": ..}` wrappers back into typed
/// values. Anything that does not decode cleanly stays an object.
fn unwrap_extended(fields: BTreeMap<String, Value>) -> Value {
    if fields.len() == 1 {
        if let Some(Value::String(hex)) = fields.get(OID_KEY) {
            if let Ok(id) = ObjectId::from_hex(hex) {
                return Value::ObjectId(id);
            }
        }
        if let Some(Value::String(repr)) = fields.get(DOUBLE_KEY) {
            let parsed = match repr.as_str() {
                "NaN" => Some(f64::NAN),
                "Infinity" => Some(f64::INFINITY),
                "-Infinity" => Some(f64::NEG_INFINITY),
                other => other.parse::<f64>().ok(),
            };
            if let Some(x) = parsed {
                return Value::Float(x);
            }
        }
    }
    Value::Object(fields)
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(fields) => Ok(Document(fields)),
            other => Err(de::Error::custom(format!("expected document, got {other}"))),
        }
    }
}
