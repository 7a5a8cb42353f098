use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};

/// Ordered mapping of field name to value. Insertion order survives save/load.
pub type Fields = IndexMap<String, FieldValue>;

/// A JSON number that remembers whether it was written as an integer or a float.
/// A progress of `30` must come back as `30`, not `30.0`.
#[derive(Debug, Clone)]
pub enum FieldNumber {
    I64(i64),
    U64(u64),
    F64(f64),
}

// Integers compare by value across I64/U64: JSON does not record which one was written.
impl PartialEq for FieldNumber {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldNumber::F64(a), FieldNumber::F64(b)) => a == b,
            (FieldNumber::F64(_), _) | (_, FieldNumber::F64(_)) => false,
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                (None, None) => matches!((a, b), (FieldNumber::U64(x), FieldNumber::U64(y)) if x == y),
                _ => false,
            },
        }
    }
}

impl FieldNumber {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldNumber::I64(v) => Some(*v),
            FieldNumber::U64(v) => i64::try_from(*v).ok(),
            FieldNumber::F64(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            FieldNumber::I64(v) => *v as f64,
            FieldNumber::U64(v) => *v as f64,
            FieldNumber::F64(v) => *v,
        }
    }

    /// Strict JSON has no spelling for NaN or the infinities.
    pub fn is_finite(&self) -> bool {
        match self {
            FieldNumber::F64(v) => v.is_finite(),
            FieldNumber::I64(_) | FieldNumber::U64(_) => true,
        }
    }
}

impl Serialize for FieldNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldNumber::I64(v) => serializer.serialize_i64(*v),
            FieldNumber::U64(v) => serializer.serialize_u64(*v),
            FieldNumber::F64(v) if !v.is_finite() => {
                Err(ser::Error::custom(format!("{v} is not representable in JSON")))
            }
            FieldNumber::F64(v) => serializer.serialize_f64(*v),
        }
    }
}

/// A value held by a record field or a working-set key.
///
/// Everything except `Opaque` and non-finite numbers maps onto strict JSON.
/// `Opaque` stands for session state that is not data at all (a widget handle,
/// a callback) and carries only a label for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(FieldNumber),
    String(String),
    Array(Vec<FieldValue>),
    Object(IndexMap<String, FieldValue>),
    Opaque(String),
}

impl FieldValue {
    pub fn as_object(&self) -> Option<&IndexMap<String, FieldValue>> {
        match self {
            FieldValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.as_object().and_then(|m| m.get(key))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Number(_) => "number",
            FieldValue::String(_) => "string",
            FieldValue::Array(_) => "array",
            FieldValue::Object(_) => "object",
            FieldValue::Opaque(_) => "opaque",
        }
    }

    /// Walks the value and reports the first part that strict JSON cannot hold.
    /// The returned string is a human-readable reason, e.g. `"[2].x: NaN is not a JSON number"`.
    pub fn check_json(&self) -> Result<(), String> {
        let mut path = String::new();
        self.check_json_at(&mut path)
    }

    pub fn is_json_serializable(&self) -> bool {
        self.check_json().is_ok()
    }

    fn check_json_at(&self, path: &mut String) -> Result<(), String> {
        let at = |path: &str, what: String| {
            if path.is_empty() {
                what
            } else {
                format!("{path}: {what}")
            }
        };
        match self {
            FieldValue::Null | FieldValue::Bool(_) | FieldValue::String(_) => Ok(()),
            FieldValue::Number(n) if n.is_finite() => Ok(()),
            FieldValue::Number(n) => Err(at(
                path.as_str(),
                format!("{} is not a JSON number", n.as_f64()),
            )),
            FieldValue::Opaque(label) => Err(at(path.as_str(), format!("opaque value `{label}`"))),
            FieldValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{i}]"));
                    v.check_json_at(path)?;
                    path.truncate(len);
                }
                Ok(())
            }
            FieldValue::Object(map) => {
                for (k, v) in map {
                    let len = path.len();
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(k);
                    v.check_json_at(path)?;
                    path.truncate(len);
                }
                Ok(())
            }
        }
    }
}

/// First key of `fields` whose value is not JSON-serializable, with the reason.
pub fn first_invalid_field(fields: &Fields) -> Option<(&str, String)> {
    fields
        .iter()
        .find_map(|(k, v)| v.check_json().err().map(|reason| (k.as_str(), reason)))
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Number(FieldNumber::I64(v.into()))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(FieldNumber::I64(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(FieldNumber::F64(v))
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Number(FieldNumber::I64(i))
                } else if let Some(u) = n.as_u64() {
                    FieldValue::Number(FieldNumber::U64(u))
                } else {
                    FieldValue::Number(FieldNumber::F64(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(values) => {
                FieldValue::Array(values.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::Number(n) => n.serialize(serializer),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Array(values) => values.serialize(serializer),
            FieldValue::Object(map) => map.serialize(serializer),
            FieldValue::Opaque(label) => Err(ser::Error::custom(format!(
                "opaque value `{label}` cannot be serialized"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> de::Visitor<'de> for ValueVisitor {
            type Value = FieldValue;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a JSON value")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FieldValue::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FieldValue::Null)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(FieldValue::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(FieldValue::Number(FieldNumber::I64(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                // serde_json reports every non-negative integer here.
                match i64::try_from(v) {
                    Ok(i) => Ok(FieldValue::Number(FieldNumber::I64(i))),
                    Err(_) => Ok(FieldValue::Number(FieldNumber::U64(v))),
                }
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(FieldValue::Number(FieldNumber::F64(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(FieldValue::String(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(FieldValue::String(v))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element::<FieldValue>()? {
                    values.push(value);
                }
                Ok(FieldValue::Array(values))
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut values = IndexMap::new();
                while let Some((key, value)) = map.next_entry::<String, FieldValue>()? {
                    values.insert(key, value);
                }
                Ok(FieldValue::Object(values))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
