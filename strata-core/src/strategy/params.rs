//! Strategy parameter sets.
//!
//! A `Params` value is an immutable, string-keyed map of typed scalars.
//! Keys are kept sorted so the canonical encoding (and the derived run id)
//! does not depend on insertion order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    Missing(String),

    #[error("parameter '{key}' should be {expected}, got {actual}")]
    WrongType {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("parameter '{key}' is out of range: {value}")]
    OutOfRange { key: String, value: String },

    #[error("parameter '{0}' is not accepted by this strategy")]
    Undeclared(String),

    #[error("parameter '{0}' must be a finite number")]
    NonFinite(String),
}

/// Immutable parameter set for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used when assembling a set.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, key: &str) -> Result<&ParamValue, ParamError> {
        self.get(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))
    }

    fn wrong_type(key: &str, expected: &'static str, actual: &ParamValue) -> ParamError {
        ParamError::WrongType {
            key: key.to_string(),
            expected,
            actual: actual.type_name(),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ParamError> {
        match self.require(key)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(Self::wrong_type(key, "int", other)),
        }
    }

    /// Integer parameter that must be at least 1, e.g. a window length.
    pub fn get_period(&self, key: &str) -> Result<usize, ParamError> {
        let value = self.get_int(key)?;
        match usize::try_from(value) {
            Ok(period) if period >= 1 => Ok(period),
            _ => Err(ParamError::OutOfRange {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Float parameter; integers are widened.
    pub fn get_float(&self, key: &str) -> Result<f64, ParamError> {
        match self.require(key)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(Self::wrong_type(key, "float", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ParamError> {
        match self.require(key)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(Self::wrong_type(key, "bool", other)),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ParamError> {
        match self.require(key)? {
            ParamValue::Str(v) => Ok(v),
            other => Err(Self::wrong_type(key, "string", other)),
        }
    }

    /// Reject NaN and infinite floats. They have no stable canonical
    /// encoding, so two such sets would share a run id.
    pub fn validate_values(&self) -> Result<(), ParamError> {
        let non_finite = self
            .0
            .iter()
            .find(|(_, v)| matches!(v, ParamValue::Float(f) if !f.is_finite()));
        match non_finite {
            Some((key, _)) => Err(ParamError::NonFinite(key.clone())),
            None => Ok(()),
        }
    }

    /// Reject non-finite values and keys not in `declared`.
    pub fn validate(&self, declared: &[&str]) -> Result<(), ParamError> {
        self.validate_values()?;
        match self.0.keys().find(|k| !declared.contains(&k.as_str())) {
            Some(key) => Err(ParamError::Undeclared(key.clone())),
            None => Ok(()),
        }
    }

    /// Canonical JSON encoding (sorted keys).
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Deterministic identifier: BLAKE3 hash of the canonical JSON.
    pub fn run_id(&self) -> String {
        blake3::hash(self.canonical_json().as_bytes())
            .to_hex()
            .to_string()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
