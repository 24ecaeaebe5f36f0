//! JSONL sink
//!
//! This sink writes one JSON object per line, each line representing a single
//! [`Sample`].

use std::io::Write;

use metrics::counter;
use time::OffsetDateTime;
use tracing::error;

use crate::{Accumulator, Fields, Sample, Tags};

/// JSONL sink errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// IO errors during write operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSONL format writer
#[derive(Debug)]
pub struct Format<W: Write> {
    writer: W,
}

impl<W: Write> Format<W> {
    /// Create a new instance of `Format`
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single sample line to the output
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn write_sample(&mut self, sample: &Sample) -> Result<(), Error> {
        let payload = serde_json::to_string(sample)?;
        self.writer.write_all(payload.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flush any buffered data to the underlying writer
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails
    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        Ok(())
    }

    /// Consume the format, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Accumulator for Format<W> {
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
        if let Err(err) = self.write_sample(&sample) {
            error!("failed to write sample for {measurement}: {err}");
            counter!("capture_write_errors").increment(1);
        }
    }

    fn flush(&mut self) {
        if let Err(err) = Format::flush(self) {
            error!("failed to flush samples: {err}");
            counter!("capture_write_errors").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldValue;
    use time::macros::datetime;

    fn tags() -> Tags {
        let mut tags = Tags::new();
        tags.insert("resource_id".to_string(), "/subscriptions/abc".to_string());
        tags
    }

    #[test]
    fn writes_valid_jsonl() {
        let mut format = Format::new(Vec::new());

        let mut fields = Fields::new();
        fields.insert("Percentage CPU".to_string(), FieldValue::Float(42.5));
        format.add_fields(
            "azure_monitor",
            fields,
            &tags(),
            datetime!(2024-01-01 00:00:00 UTC),
        );

        let output = String::from_utf8(format.into_inner()).expect("should be valid UTF-8");
        assert!(output.ends_with('\n'), "should end with newline");

        let parsed: Sample = serde_json::from_str(output.trim()).expect("should deserialize");
        assert_eq!(parsed.measurement, "azure_monitor");
        assert_eq!(parsed.timestamp, datetime!(2024-01-01 00:00:00 UTC));
        assert_eq!(
            parsed.fields.get("Percentage CPU"),
            Some(&FieldValue::Float(42.5))
        );
        assert_eq!(parsed.tags, tags());
    }

    #[test]
    fn multiple_samples_produce_multiple_lines() {
        let mut format = Format::new(Vec::new());

        for minute in 0..5u8 {
            let mut fields = Fields::new();
            fields.insert("Network In".to_string(), FieldValue::Float(f64::from(minute)));
            let timestamp = datetime!(2024-01-01 00:00:00 UTC)
                + time::Duration::minutes(i64::from(minute));
            format.add_fields("azure_monitor", fields, &tags(), timestamp);
        }
        format.flush().expect("flush should succeed");

        let output = String::from_utf8(format.into_inner()).expect("should be valid UTF-8");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[4].contains(r#""timestamp":"2024-01-01T00:04:00Z""#));
    }
}
