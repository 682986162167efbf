//! Input points and dataset identity

use crate::{AggregatorError, Result};
use std::fmt;

/// A raw map point with an arbitrary payload
///
/// Coordinates are in map pixels, with the origin at the top-left corner of the map.
/// The payload is opaque to the engine; the configured weight function derives the
/// point's contribution from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Point<P = ()> {
    pub x: f64,
    pub y: f64,
    pub payload: P,
}

impl Point<()> {
    /// Create a point without payload
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, payload: () }
    }
}

impl<P> Point<P> {
    /// Create a point carrying a payload
    #[inline]
    pub fn with_payload(x: f64, y: f64, payload: P) -> Self {
        Self { x, y, payload }
    }
}

/// Identity and version of a dataset
///
/// The rendered form `<id>:v<version>` prefixes every remote cache key, so bumping the
/// version is how callers retire remote entries computed from older data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    id: String,
    version: u64,
}

impl DatasetKey {
    /// Create a dataset key
    ///
    /// The id must be non-empty and free of whitespace.
    pub fn new(id: impl Into<String>, version: u64) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(AggregatorError::InvalidDatasetKey(
                "dataset id is empty".to_string(),
            ));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(AggregatorError::InvalidDatasetKey(format!(
                "dataset id {id:?} contains whitespace"
            )));
        }
        Ok(Self { id, version })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}", self.id, self.version)
    }
}
