//! Crate regarding azmon's downstream 'accumulator'
//!
//! Inputs in azmon are unaware of where their observations end up. Each poll
//! cycle hands its results to an [`Accumulator`] through a single "add fields"
//! operation and the sinks in this crate decide what happens next: buffer in
//! memory, write JSON lines or republish through the [`metrics`] facade.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::perf)]
#![deny(clippy::suspicious)]
#![deny(clippy::complexity)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![allow(clippy::multiple_crate_versions)]

pub mod gauge;
pub mod jsonl;
pub mod manager;
pub mod sample;

use time::OffsetDateTime;

pub use sample::{FieldValue, Fields, Sample, Tags};

/// Destination for the field sets produced by a poll cycle.
///
/// An accumulator receives one call per distinct timestamp. Implementations
/// own their failure handling: a sink that cannot persist a sample logs and
/// counts the failure rather than failing the caller's cycle.
pub trait Accumulator: Send {
    /// Record `fields` under `measurement`, labelled with `tags` and tied to
    /// `timestamp`.
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: &Tags,
        timestamp: OffsetDateTime,
    );

    /// Push any buffered samples to their destination. Sinks that do not
    /// buffer need not implement this.
    fn flush(&mut self) {}
}

impl Accumulator for Vec<Sample> {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: &Tags,
        timestamp: OffsetDateTime,
    ) {
        self.push(Sample {
            measurement: measurement.to_string(),
            timestamp,
            fields,
            tags: tags.clone(),
        });
    }
}
