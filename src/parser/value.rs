// ABOUTME: Typed configuration values used by task overrides and resolved config trees
// ABOUTME: Provides dotted-path lookup, assignment, truthiness, and type compatibility checks

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered mapping of configuration keys to values.
pub type ConfigMap = IndexMap<String, ConfigValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(ConfigMap),
}

impl ConfigValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "none",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::List(_) => "list",
            ConfigValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Python-style truthiness: false, None, zero, "" and [] are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            ConfigValue::Null => false,
            ConfigValue::Bool(b) => *b,
            ConfigValue::Int(i) => *i != 0,
            ConfigValue::Float(f) => *f != 0.0,
            ConfigValue::String(s) => !s.is_empty(),
            ConfigValue::List(items) => !items.is_empty(),
            ConfigValue::Map(map) => !map.is_empty(),
        }
    }

    /// Whether `self` may replace a field whose default is `default`.
    ///
    /// A `None` default accepts anything, and any field may be set to `None`.
    /// Integers are accepted where floats are expected.
    pub fn is_compatible_with(&self, default: &ConfigValue) -> bool {
        match (self, default) {
            (_, ConfigValue::Null) | (ConfigValue::Null, _) => true,
            (ConfigValue::Int(_), ConfigValue::Float(_)) => true,
            (ConfigValue::Map(_), ConfigValue::Map(_)) => false,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }

    /// Look up a nested value by path segments, walking maps.
    pub fn get_path(&self, segments: &[&str]) -> Option<&ConfigValue> {
        match segments.split_first() {
            None => Some(self),
            Some((head, rest)) => self.as_map()?.get(*head)?.get_path(rest),
        }
    }
}

/// Look up a dotted key (e.g. `connections.outputExposure`) in a config map.
pub fn lookup<'a>(map: &'a ConfigMap, key: &str) -> Option<&'a ConfigValue> {
    let segments: Vec<&str> = key.split('.').collect();
    lookup_segments(map, &segments)
}

pub fn lookup_segments<'a>(map: &'a ConfigMap, segments: &[&str]) -> Option<&'a ConfigValue> {
    let (head, rest) = segments.split_first()?;
    map.get(*head)?.get_path(rest)
}

/// Replace the value at an existing dotted key. Returns the previous value,
/// or `None` when the key does not exist (assignment never creates fields).
pub fn assign(map: &mut ConfigMap, key: &str, value: ConfigValue) -> Option<ConfigValue> {
    let segments: Vec<&str> = key.split('.').collect();
    let (last, parents) = segments.split_last()?;

    let mut current = map;
    for segment in parents {
        current = match current.get_mut(*segment)? {
            ConfigValue::Map(inner) => inner,
            _ => return None,
        };
    }

    let slot = current.get_mut(*last)?;
    Some(std::mem::replace(slot, value))
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Null => write!(f, "None"),
            ConfigValue::Bool(true) => write!(f, "True"),
            ConfigValue::Bool(false) => write!(f, "False"),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{:?}", v),
            ConfigValue::String(s) => write!(f, "'{}'", s),
            ConfigValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ConfigValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(values: Vec<T>) -> Self {
        ConfigValue::List(values.into_iter().map(Into::into).collect())
    }
}
