//! Read-only access into decoded Kubernetes objects
//!
//! A [`Record`] wraps a decoded JSON document and resolves a path of string
//! segments against it. Lookups only descend through JSON objects; hitting an
//! array, scalar, or null before the path is exhausted is a miss, not an error.

use serde_json::{Map, Value};

/// Read-only view over a decoded object
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    root: Value,
}

impl Record {
    /// Wrap an already-decoded document
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// An empty object, used when a request carries no prior object
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// Decode a record from raw JSON bytes
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw).map(Self::new)
    }

    /// Look up the value addressed by `segments`
    ///
    /// Returns `None` for an empty path, for any missing key, and whenever an
    /// intermediate value is not an object.
    pub fn get<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        if segments.is_empty() {
            return None;
        }

        segments.iter().try_fold(&self.root, |current, segment| {
            current.as_object()?.get(segment.as_ref())
        })
    }
}

impl From<Value> for Record {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}
