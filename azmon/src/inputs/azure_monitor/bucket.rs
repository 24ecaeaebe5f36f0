//! Reshape a [`MonitorResponse`] into one field set per timestamp
//!
//! The response nests points three deep: metric, series, datum. Points of
//! different metrics that share a timestamp belong to the same sample, so the
//! nesting is flattened into a map keyed by the raw timestamp string and each
//! entry is emitted once.
//!
//! A timestamp that does not parse as RFC3339 drops its field set and nothing
//! else. Losing one sample is preferable to losing the cycle; the drop is
//! logged at debug level and counted in `azure_monitor_dropped_samples`.

use std::collections::BTreeMap;

use azmon_capture::{FieldValue, Fields};
use metrics::counter;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use super::response::MonitorResponse;

/// The fields observed at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    /// The parsed timestamp shared by every field.
    pub timestamp: OffsetDateTime,
    /// Metric key to value.
    pub fields: Fields,
}

/// Group every point in `response` by timestamp.
///
/// Produces exactly one [`FieldSet`] per distinct timestamp string that parses
/// as RFC3339. Within a field set the last point written for a metric key
/// wins. Field sets are returned in ascending order of their raw timestamp
/// string.
#[must_use]
pub fn bucketize(response: &MonitorResponse) -> Vec<FieldSet> {
    let mut by_timestamp: BTreeMap<&str, Fields> = BTreeMap::new();

    for metric in &response.value {
        let name = metric.name.value.as_str();
        for series in &metric.timeseries {
            for point in &series.data {
                by_timestamp
                    .entry(point.time_stamp.as_str())
                    .or_default()
                    .insert(name.to_string(), FieldValue::from(point.average));
            }
        }
    }

    let mut dropped: u64 = 0;
    let field_sets: Vec<FieldSet> = by_timestamp
        .into_iter()
        .filter_map(
            |(raw, fields)| match OffsetDateTime::parse(raw, &Rfc3339) {
                Ok(timestamp) => Some(FieldSet { timestamp, fields }),
                Err(err) => {
                    debug!(
                        "dropping {} fields at unparseable timestamp {raw:?}: {err}",
                        fields.len()
                    );
                    dropped += 1;
                    None
                }
            },
        )
        .collect();

    if dropped > 0 {
        counter!("azure_monitor_dropped_samples").increment(dropped);
    }
    field_sets
}
