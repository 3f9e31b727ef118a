//! Request/response data model and the columnar-to-row transform.
//!
//! The API answers every query with a columnar payload:
//!
//! ```text
//! { "fields": ["ts_code", "name"], "items": [["000001.SZ", "Ping An Bank"], ...] }
//! ```
//!
//! [`transform`] zips each item with the field list into a [`Row`].

use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Closed scalar union used for request parameters and row cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Request parameters keyed by name. Iteration is always in ascending name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Scalar>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Option<Scalar> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Scalar>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// One logical API call: endpoint, credential, parameters and optional field projection.
#[derive(Clone, PartialEq)]
pub struct RequestDescriptor {
    pub endpoint: String,
    pub token: String,
    pub params: Params,
    pub fields: Option<Vec<String>>,
}

impl RequestDescriptor {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, params: Params) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            params,
            fields: None,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

impl Debug for RequestDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("params", &self.params)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Columnar result set: `items[i][j]` belongs to `fields[j]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    pub fields: Vec<String>,
    #[serde(default)]
    pub items: Vec<Vec<Scalar>>,
}

/// Decoded response of a single transport exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub code: i64,
    pub message: String,
    pub payload: Option<WirePayload>,
}

impl WireResponse {
    /// Rows of the payload; an absent payload is an empty result set.
    pub fn into_rows(self) -> Vec<Row> {
        self.payload.as_ref().map(transform).unwrap_or_default()
    }
}

/// A single result row keyed by field name.
pub type Row = BTreeMap<String, Scalar>;

/// Zips every item with the field list, preserving item order.
///
/// A short item yields a row without its trailing fields; they are not filled with `Null`.
pub fn transform(payload: &WirePayload) -> Vec<Row> {
    payload
        .items
        .iter()
        .map(|item| {
            payload
                .fields
                .iter()
                .zip(item)
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()
        })
        .collect()
}
