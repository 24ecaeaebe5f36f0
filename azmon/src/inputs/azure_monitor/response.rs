//! Azure Monitor metrics response model and parser
//!
//! The provider documents its payload in camel case but makes no promises about
//! casing and omits or nulls fields freely. Decoding is therefore lenient at
//! the leaves: object keys are matched without regard to case, `null` is
//! treated as absent and every absent field takes its zero value. A body that
//! is not JSON at all, or carries a value of the wrong type, is rejected.
//! Structured positions only accept JSON objects: serde would otherwise read a
//! struct out of a positional array.

use serde::{
    Deserialize, Deserializer,
    de::{DeserializeOwned, Error as _, Unexpected},
};
use serde_json::Value;

use super::Error;

/// Display label and stable machine key of a metric or dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricName {
    /// Stable machine-readable key, e.g. `Percentage CPU`.
    pub value: String,
    /// Human readable label.
    #[serde(rename = "localizedvalue")]
    pub localized_value: String,
}

/// One observed value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataPoint {
    /// Average over the point's interval.
    pub average: f64,
    /// RFC3339 timestamp as sent by the provider, unparsed.
    #[serde(rename = "timestamp")]
    pub time_stamp: String,
}

/// A single dimension of a [`TimeSeries`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataValue {
    /// Name of the dimension.
    #[serde(deserialize_with = "object")]
    pub name: MetricName,
    /// Value of the dimension for this series.
    pub value: String,
}

/// Ordered points of one metric, optionally split along dimensions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeSeries {
    /// Points in provider order.
    #[serde(deserialize_with = "objects")]
    pub data: Vec<DataPoint>,
    /// Dimensions this series is broken down by.
    #[serde(rename = "metadatavalues", deserialize_with = "objects")]
    pub metadata_values: Vec<MetadataValue>,
}

/// One metric's full response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricValue {
    /// Provider identifier of the metric.
    pub id: String,
    /// Name of the metric.
    #[serde(deserialize_with = "object")]
    pub name: MetricName,
    /// Unit of the metric's values, e.g. `Percent`.
    pub unit: String,
    /// Provider type of the entry.
    #[serde(rename = "type")]
    pub kind: String,
    /// Provider error code, `Success` on success.
    #[serde(rename = "errorcode")]
    pub error_code: String,
    /// Description of the metric.
    #[serde(rename = "displaydescription")]
    pub display_description: String,
    /// Series the metric produced over the requested window.
    #[serde(deserialize_with = "objects")]
    pub timeseries: Vec<TimeSeries>,
}

/// The top-level decoded payload of a metrics request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorResponse {
    /// Cost estimate of the query.
    pub cost: f64,
    /// Granularity of the returned points, ISO 8601 duration.
    pub interval: String,
    /// Metric namespace.
    pub namespace: String,
    /// Region of the monitored resource.
    #[serde(rename = "resourceregion")]
    pub resource_region: String,
    /// Window the points cover.
    pub timespan: String,
    /// One entry per metric.
    #[serde(deserialize_with = "objects")]
    pub value: Vec<MetricValue>,
}

/// Read the whole body of `response` and decode it.
///
/// The response is consumed, releasing its connection on every path.
///
/// # Errors
///
/// Returns [`Error::Transport`] if reading the body fails, otherwise see
/// [`decode`].
pub async fn parse_response(response: reqwest::Response) -> Result<MonitorResponse, Error> {
    let status = response.status();
    let body = response.bytes().await?;
    decode(status.as_u16(), &body)
}

/// Decode a completed response from its status code and body.
///
/// # Errors
///
/// Returns [`Error::Provider`] carrying the status and verbatim body if the
/// status is outside `200..=299`; the body is not decoded in that case.
/// Returns [`Error::Decode`] if the body is not JSON or a present value has the
/// wrong type.
pub fn decode(status: u16, body: &[u8]) -> Result<MonitorResponse, Error> {
    if !(200..=299).contains(&status) {
        return Err(Error::Provider {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    let value: Value = serde_json::from_slice(body)?;
    match value {
        Value::Null => Ok(MonitorResponse::default()),
        Value::Object(_) => serde_json::from_value(normalize(value)).map_err(Error::from),
        other => Err(serde_json::Error::invalid_type(unexpected(&other), &"a JSON object").into()),
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

fn from_object<T, E>(value: Value) -> Result<T, E>
where
    T: DeserializeOwned,
    E: serde::de::Error,
{
    if !value.is_object() {
        return Err(E::invalid_type(unexpected(&value), &"a JSON object"));
    }
    T::deserialize(value).map_err(E::custom)
}

/// Deserialize a struct, accepting only a JSON object.
fn object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    from_object(Value::deserialize(deserializer)?)
}

/// Deserialize a list of structs, accepting only JSON objects as elements.
fn objects<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Vec::<Value>::deserialize(deserializer)?
        .into_iter()
        .map(from_object)
        .collect()
}

/// Lowercase every object key and drop `null` entries, recursively.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.to_lowercase(), normalize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(normalize)
                .collect(),
        ),
        other => other,
    }
}
