//! Snapshot types shared by the store, the validator, and the sync strategies.
//!
//! A [`ConfigSnapshot`] is the complete view of the remote configuration set
//! at one point in time. Updates never patch a snapshot; they publish a new
//! one that replaces the previous view wholesale.

use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Scalar configuration value. Only strings and booleans are valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean flag.
    Bool(bool),
    /// Free-form string value.
    String(String),
}

impl ConfigValue {
    /// Returns the string payload, or `None` for booleans.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(value) => Some(value.as_str()),
            ConfigValue::Bool(_) => None,
        }
    }

    /// Returns the boolean payload, or `None` for strings.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            ConfigValue::String(_) => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(value) => write!(f, "{value}"),
            ConfigValue::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// Immutable mapping from configuration key to [`ConfigValue`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfigSnapshot {
    entries: HashMap<String, ConfigValue>,
}

impl ConfigSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a single key.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    /// Returns `true` when the key exists in the snapshot.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys in the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` for a snapshot without keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all key/value pairs in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, ConfigValue> {
        self.entries.iter()
    }

    /// Iterates over all keys in arbitrary order.
    pub fn keys(&self) -> hash_map::Keys<'_, String, ConfigValue> {
        self.entries.keys()
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigSnapshot
where
    K: Into<String>,
    V: Into<ConfigValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ConfigSnapshot {
    type Item = (&'a String, &'a ConfigValue);
    type IntoIter = hash_map::Iter<'a, String, ConfigValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
