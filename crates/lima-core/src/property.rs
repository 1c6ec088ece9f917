//! Device properties and the property database.
//!
//! Device properties are persisted outside the server as string lists keyed by
//! device name. [`PropertyDatabase`] is the seam to that store; this crate
//! only ships the in-memory [`MemoryDatabase`] used by configuration files and
//! tests.

use crate::error::{LimaError, LimaResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A persisted property value.
///
/// The database always stores lists. Single-element lists are collapsed to a
/// scalar when building a [`PropertyTable`]. Numbers and booleans are
/// accepted on input and stored as their text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Single value
    Scalar(String),
    /// Several values
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl From<RawScalar> for String {
    fn from(raw: RawScalar) -> Self {
        match raw {
            RawScalar::Text(text) => text,
            RawScalar::Bool(flag) => flag.to_string(),
            RawScalar::Int(n) => n.to_string(),
            RawScalar::Float(x) => x.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Scalar(RawScalar),
    List(Vec<RawScalar>),
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawValue::deserialize(deserializer)? {
            RawValue::Scalar(raw) => Self::Scalar(raw.into()),
            RawValue::List(raw) => Self::List(raw.into_iter().map(String::from).collect()),
        })
    }
}

impl PropertyValue {
    /// Collapse a raw database list: one element becomes a scalar.
    pub fn from_list(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Scalar(values.remove(0))
        } else {
            Self::List(values)
        }
    }

    /// Scalar value, `None` for a list.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::List(_) => None,
        }
    }

    /// Values as a list, a scalar being a one-element list.
    pub fn as_list(&self) -> Vec<&str> {
        match self {
            Self::Scalar(value) => vec![value.as_str()],
            Self::List(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Raw list form, as stored in the database.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::Scalar(value) => vec![value],
            Self::List(values) => values,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

/// Properties of one device, passed as named arguments to a control-object
/// constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyTable {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property.
    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.entries.insert(key.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Raw value.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// Scalar value as text.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_scalar)
    }

    /// Scalar value parsed into `T`. `Ok(None)` when the key is absent.
    pub fn parse<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let text = value
            .as_scalar()
            .ok_or_else(|| anyhow::anyhow!("property '{key}' expects a single value"))?;
        text.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("property '{key}' = '{text}': {e}"))
    }

    /// Property names, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the table holds no property.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyTable {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Device entry of a server instance, as listed by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClassEntry {
    /// Fully-qualified device name
    pub device_name: String,
    /// Class the device belongs to
    pub class_name: String,
}

/// External key/value store holding device properties.
pub trait PropertyDatabase: Send + Sync {
    /// Devices (and their class) declared for a server instance
    /// (`<exec_name>/<instance>`).
    fn device_class_list(&self, server: &str) -> LimaResult<Vec<DeviceClassEntry>>;

    /// Names of the properties of `device` matching `pattern` (`*` for all).
    fn device_property_list(&self, device: &str, pattern: &str) -> LimaResult<Vec<String>>;

    /// Raw values of one property, empty when unset.
    fn device_property(&self, device: &str, name: &str) -> LimaResult<Vec<String>>;
}

/// Device record held by [`MemoryDatabase`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Fully-qualified device name
    pub name: String,
    /// Class name
    pub class: String,
    /// Persisted properties
    #[serde(default)]
    pub properties: PropertyTable,
}

/// In-memory property database for a single server instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    server: String,
    devices: Vec<DeviceRecord>,
}

impl MemoryDatabase {
    /// Empty database serving `server` (`<exec_name>/<instance>`).
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            devices: Vec::new(),
        }
    }

    /// Add a device record, replacing any device with the same name.
    pub fn add_device(&mut self, record: DeviceRecord) {
        self.devices.retain(|d| !d.name.eq_ignore_ascii_case(&record.name));
        self.devices.push(record);
    }

    /// Builder form of [`add_device`](Self::add_device).
    pub fn with_device(
        mut self,
        name: impl Into<String>,
        class: impl Into<String>,
        properties: PropertyTable,
    ) -> Self {
        self.add_device(DeviceRecord {
            name: name.into(),
            class: class.into(),
            properties,
        });
        self
    }

    fn record(&self, device: &str) -> LimaResult<&DeviceRecord> {
        self.devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(device))
            .ok_or_else(|| LimaError::Database(format!("device '{device}' not defined")))
    }
}

/// Glob match supporting `*` only, case-insensitive like device property names.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let name = name.to_lowercase();
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return true;
    };
    if !name.starts_with(first) {
        return false;
    }
    let mut rest = &name[first.len()..];
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

impl PropertyDatabase for MemoryDatabase {
    fn device_class_list(&self, server: &str) -> LimaResult<Vec<DeviceClassEntry>> {
        if !self.server.eq_ignore_ascii_case(server) {
            return Ok(Vec::new());
        }
        Ok(self
            .devices
            .iter()
            .map(|d| DeviceClassEntry {
                device_name: d.name.clone(),
                class_name: d.class.clone(),
            })
            .collect())
    }

    fn device_property_list(&self, device: &str, pattern: &str) -> LimaResult<Vec<String>> {
        Ok(self
            .record(device)?
            .properties
            .keys()
            .filter(|name| wildcard_match(pattern, name))
            .map(str::to_string)
            .collect())
    }

    fn device_property(&self, device: &str, name: &str) -> LimaResult<Vec<String>> {
        Ok(self
            .record(device)?
            .properties
            .get(name)
            .cloned()
            .map(PropertyValue::into_list)
            .unwrap_or_default())
    }
}
