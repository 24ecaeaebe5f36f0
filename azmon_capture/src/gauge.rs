//! Gauge sink
//!
//! Republishes samples through the [`metrics`] facade so whatever recorder the
//! host installed, typically the Prometheus exporter, serves them. Each float
//! field becomes a gauge named `<measurement>/<field>` labelled with the
//! sample's tags. The facade has no notion of an observation time, so only the
//! most recent value per series survives and the timestamp is dropped.

use metrics::gauge;
use time::OffsetDateTime;
use tracing::trace;

use crate::{Accumulator, Fields, Tags};

/// The gauge sink. Holds no state of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gauges;

impl Accumulator for Gauges {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: &Tags,
        _timestamp: OffsetDateTime,
    ) {
        let labels: Vec<(String, String)> = tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (name, value) in fields {
            let Some(value) = value.as_f64() else {
                trace!("skipping non-numeric field {name} of {measurement}");
                continue;
            };
            if value.is_nan() {
                trace!("skipping NaN field {name} of {measurement}");
                continue;
            }
            gauge!(format!("{measurement}/{name}"), &labels).set(value);
        }
    }
}

#[allow(clippy::mutable_key_type)] // CompositeKey has interior mutability
#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldValue;
    use metrics::{Key, Label};
    use metrics_util::{
        CompositeKey, MetricKind,
        debugging::{DebugValue, DebuggingRecorder},
    };
    use time::macros::datetime;

    #[test]
    fn float_fields_become_labelled_gauges() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        let mut fields = Fields::new();
        fields.insert("Percentage CPU".to_string(), FieldValue::Float(42.5));
        fields.insert("sku".to_string(), FieldValue::String("Standard".to_string()));
        fields.insert("broken".to_string(), FieldValue::Float(f64::NAN));
        let mut tags = Tags::new();
        tags.insert("resource_id".to_string(), "/subscriptions/abc".to_string());

        metrics::with_local_recorder(&recorder, || {
            Gauges.add_fields(
                "azure_monitor",
                fields,
                &tags,
                datetime!(2024-01-01 00:00:00 UTC),
            );
        });

        let snapshot = snapshotter.snapshot().into_hashmap();
        assert_eq!(snapshot.len(), 1);

        let metric = snapshot
            .get(&CompositeKey::new(
                MetricKind::Gauge,
                Key::from_parts(
                    "azure_monitor/Percentage CPU",
                    vec![Label::new("resource_id", "/subscriptions/abc")],
                ),
            ))
            .expect("metric not found");
        match metric.2 {
            DebugValue::Gauge(value) => assert_eq!(value, 42.5),
            _ => panic!("unexpected metric type"),
        }
    }
}
