//! Runtime values.
//!
//! Every expression evaluates to a [`Value`]:
//! - `null`
//! - bool
//! - number (`f64`, whole numbers render without a fractional part)
//! - string
//! - list (ordered)
//! - map (string keys, kept in sorted-key order so iteration is reproducible)
//!
//! Equality (`==`) requires the same tag and equal contents. Ordering via [`Value::compare`] is
//! only defined between strings, numbers or bools of the same tag.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::EvalError;

pub type Map = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it is a whole number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Render for template interpolation. Only strings, numbers and bools can be interpolated.
    pub fn to_template_string(&self) -> Result<String, EvalError> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(format_number(*n)),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Err(EvalError::type_error("cannot interpolate a null value")),
            other => Err(EvalError::type_error(format!(
                "cannot interpolate a {}; convert it explicitly, e.g. with join()",
                other.kind()
            ))),
        }
    }

    /// Compare two values of the same primitive tag.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {k:?} = {v}")?;
                }
                if !map.is_empty() {
                    f.write_str(" ")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => match self.as_i64() {
                Some(i) if n.abs() < 1e15 => serializer.serialize_i64(i),
                _ => serializer.serialize_f64(*n),
            },
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl TryFrom<serde_yaml::Value> for Value {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value as Yaml;
        Ok(match value {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => Value::Bool(b),
            Yaml::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            Yaml::String(s) => Value::String(s),
            Yaml::Sequence(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Yaml::Mapping(mapping) => {
                let mut map = Map::new();
                for (k, v) in mapping {
                    let key = match k {
                        Yaml::String(s) => s,
                        Yaml::Number(n) => n.to_string(),
                        Yaml::Bool(b) => b.to_string(),
                        other => return Err(format!("unsupported YAML map key: {other:?}")),
                    };
                    map.insert(key, Value::try_from(v)?);
                }
                Value::Map(map)
            }
            Yaml::Tagged(tagged) => Value::try_from(tagged.value)?,
        })
    }
}

/// A type constraint, as written in a `variable` block or a function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Any,
    String,
    Number,
    Bool,
    List(Box<ValueType>),
    Set(Box<ValueType>),
    Map(Box<ValueType>),
}

impl ValueType {
    pub fn list_of(inner: ValueType) -> Self {
        ValueType::List(Box::new(inner))
    }

    pub fn map_of(inner: ValueType) -> Self {
        ValueType::Map(Box::new(inner))
    }

    pub fn set_of(inner: ValueType) -> Self {
        ValueType::Set(Box::new(inner))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::String => f.write_str("string"),
            ValueType::Number => f.write_str("number"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::List(inner) => write!(f, "list({inner})"),
            ValueType::Set(inner) => write!(f, "set({inner})"),
            ValueType::Map(inner) => write!(f, "map({inner})"),
        }
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match s.as_str() {
            "any" => return Ok(ValueType::Any),
            "string" => return Ok(ValueType::String),
            "number" => return Ok(ValueType::Number),
            "bool" => return Ok(ValueType::Bool),
            "list" => return Ok(ValueType::list_of(ValueType::Any)),
            "set" => return Ok(ValueType::set_of(ValueType::Any)),
            "map" => return Ok(ValueType::map_of(ValueType::Any)),
            _ => {}
        }
        let (ctor, rest) = s
            .split_once('(')
            .ok_or_else(|| format!("unknown type '{s}'"))?;
        let inner = rest
            .strip_suffix(')')
            .ok_or_else(|| format!("unbalanced parentheses in type '{s}'"))?;
        let inner: ValueType = inner.parse()?;
        match ctor {
            "list" => Ok(ValueType::list_of(inner)),
            "set" => Ok(ValueType::set_of(inner)),
            "map" => Ok(ValueType::map_of(inner)),
            other => Err(format!("unknown type constructor '{other}'")),
        }
    }
}

/// Convert `value` to `target` following HCL's implicit conversion rules.
pub fn coerce(value: &Value, target: &ValueType) -> Result<Value, EvalError> {
    let mismatch = || {
        EvalError::type_error(format!("cannot convert {} to {target}", value.kind()))
    };
    match (target, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ValueType::Any, v) => Ok(v.clone()),
        (ValueType::String, v) => match v {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(format_number(*n))),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch()),
        },
        (ValueType::Number, v) => match v {
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::String(s) => s.trim().parse::<f64>().map(Value::Number).map_err(|_| {
                EvalError::type_error(format!("cannot convert string {s:?} to number"))
            }),
            _ => Err(mismatch()),
        },
        (ValueType::Bool, v) => match v {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        (ValueType::List(inner), Value::List(items)) => items
            .iter()
            .map(|item| coerce(item, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (ValueType::Set(inner), Value::List(items)) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                let item = coerce(item, inner)?;
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            out.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
            Ok(Value::List(out))
        }
        (ValueType::Map(inner), Value::Map(map)) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), coerce(v, inner)?)))
            .collect::<Result<Map, EvalError>>()
            .map(Value::Map),
        _ => Err(mismatch()),
    }
}
