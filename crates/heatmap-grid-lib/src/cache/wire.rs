//! Versioned wire format for remote cache entries
//!
//! Besides the points, every document records the schema version and the parameters that
//! shaped the result. A document whose parameters differ from the requesting configuration
//! is rejected, so a deploy that changes the format or the map setup never reads back
//! incompatible entries.

use crate::{AggregatedPoint, AggregatorConfig, CacheError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Current schema version; bump on any incompatible change to [`CachedAggregate`]
pub const SCHEMA_VERSION: u32 = 1;

/// Parameters that determine an aggregation result, apart from the dataset itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateFingerprint {
    pub cell_size: u32,
    pub map_width: u32,
    pub map_height: u32,
    pub min_points_per_cell: usize,
}

impl AggregateFingerprint {
    pub fn new<P>(cell_size: u32, config: &AggregatorConfig<P>) -> Self {
        Self {
            cell_size,
            map_width: config.map_width,
            map_height: config.map_height,
            min_points_per_cell: config.min_points_per_cell,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedAggregate<'a> {
    schema: u32,
    cell_size: u32,
    map_width: u32,
    map_height: u32,
    min_points_per_cell: usize,
    points: Cow<'a, [AggregatedPoint]>,
}

#[derive(Deserialize)]
struct SchemaProbe {
    schema: u32,
}

/// Serialize an aggregate for the remote tier
pub fn encode(
    fingerprint: &AggregateFingerprint,
    points: &[AggregatedPoint],
) -> Result<String, CacheError> {
    let document = CachedAggregate {
        schema: SCHEMA_VERSION,
        cell_size: fingerprint.cell_size,
        map_width: fingerprint.map_width,
        map_height: fingerprint.map_height,
        min_points_per_cell: fingerprint.min_points_per_cell,
        points: Cow::Borrowed(points),
    };
    Ok(serde_json::to_string(&document)?)
}

/// Parse a remote payload, checking it was produced under `expected`
pub fn decode(
    payload: &str,
    expected: &AggregateFingerprint,
) -> Result<Vec<AggregatedPoint>, CacheError> {
    // Check the version first so older layouts report a mismatch instead of a parse error
    let probe: SchemaProbe = serde_json::from_str(payload)?;
    if probe.schema != SCHEMA_VERSION {
        return Err(CacheError::SchemaMismatch {
            reason: format!(
                "schema version {} (expected {SCHEMA_VERSION})",
                probe.schema
            ),
        });
    }

    let document: CachedAggregate<'static> = serde_json::from_str(payload)?;
    let found = AggregateFingerprint {
        cell_size: document.cell_size,
        map_width: document.map_width,
        map_height: document.map_height,
        min_points_per_cell: document.min_points_per_cell,
    };
    if found != *expected {
        return Err(CacheError::SchemaMismatch {
            reason: format!("entry produced with {found:?}, requested {expected:?}"),
        });
    }
    Ok(document.points.into_owned())
}
