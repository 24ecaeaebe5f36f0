//! Fan-in of samples from concurrently running inputs
//!
//! Every input runs its own poll loop and may emit at any moment. Rather than
//! share a sink behind a lock each input holds a cheap [`Handle`] that forwards
//! samples over a channel to the single [`CaptureManager`] that owns the sink.
//! The manager runs until every handle has been dropped, flushing the sink
//! whenever the channel runs dry.

use metrics::counter;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Accumulator, Fields, Sample, Tags};

/// Owner of the sink samples are ultimately written to.
#[derive(Debug)]
pub struct CaptureManager<A> {
    accumulator: A,
    receiver: mpsc::UnboundedReceiver<Sample>,
}

/// Accumulator that forwards samples to a [`CaptureManager`].
#[derive(Debug, Clone)]
pub struct Handle {
    sender: mpsc::UnboundedSender<Sample>,
}

impl<A: Accumulator> CaptureManager<A> {
    /// Create a new [`CaptureManager`] around `accumulator` and the first
    /// [`Handle`] feeding it. Clone the handle for additional inputs.
    #[must_use]
    pub fn new(accumulator: A) -> (Self, Handle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                accumulator,
                receiver,
            },
            Handle { sender },
        )
    }

    /// Run this [`CaptureManager`] to completion
    ///
    /// Returns once every [`Handle`] has been dropped and all samples sent
    /// through them were handed to the sink. The sink is returned to the
    /// caller after a final flush.
    pub async fn run(mut self) -> A {
        info!("capture manager running");
        while let Some(sample) = self.receiver.recv().await {
            self.record(sample);
            // Drain whatever else is ready before paying for a flush.
            while let Ok(sample) = self.receiver.try_recv() {
                self.record(sample);
            }
            self.accumulator.flush();
        }
        self.accumulator.flush();
        info!("all capture handles dropped, capture manager shutting down");
        self.accumulator
    }

    fn record(&mut self, sample: Sample) {
        debug!(
            "recording {} fields of {} at {}",
            sample.fields.len(),
            sample.measurement,
            sample.timestamp
        );
        self.accumulator.add_fields(
            &sample.measurement,
            sample.fields,
            &sample.tags,
            sample.timestamp,
        );
    }
}

impl Accumulator for Handle {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: &Tags,
        timestamp: OffsetDateTime,
    ) {
        let sample = Sample {
            measurement: measurement.to_string(),
            timestamp,
            fields,
            tags: tags.clone(),
        };
        if self.sender.send(sample).is_err() {
            warn!("capture manager is gone, dropping sample of {measurement}");
            counter!("capture_dropped_samples").increment(1);
        }
    }
}
