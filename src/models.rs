use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Everything the upstream cluster endpoint hands us in one document.
///
/// Decoding is lenient below the top level: a field of the wrong shape is
/// treated as missing, and a worker that is not an object is dropped, so one
/// bad entry never hides the rest of the cluster.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ClusterData {
    #[serde(default, deserialize_with = "lenient_config")]
    pub config: ClusterConfig,
    /// Worker type names; the values are opaque to this view.
    #[serde(default, deserialize_with = "lenient_object")]
    pub types: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "lenient_workers")]
    pub workers: BTreeMap<String, Worker>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ClusterConfig {
    /// Grafana base URL, used for the metrics proxy and the node dashboard.
    #[serde(default, deserialize_with = "lenient_text")]
    pub grafana: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Worker {
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: BTreeMap<String, Quantities>,
    /// A numeric address is kept as its text.
    #[serde(default, deserialize_with = "lenient_address")]
    pub ip: Option<String>,
    /// Only a string names a type; anything else matches no filter.
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    pub worker_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_health")]
    pub healthy: Health,
}

/// Raw capacity accounting for one resource on one worker.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
pub struct Quantities {
    #[serde(default, deserialize_with = "lenient_number")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub allocatable: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub used: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub preemptable: Option<f64>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_address<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_object<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    })
}

fn lenient_config<'de, D>(deserializer: D) -> Result<ClusterConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_status<'de, D>(deserializer: D) -> Result<BTreeMap<String, Quantities>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = lenient_object(deserializer)?;
    Ok(entries
        .into_iter()
        .filter_map(|(resource, value)| {
            serde_json::from_value(value)
                .ok()
                .map(|quantities| (resource, quantities))
        })
        .collect())
}

fn lenient_workers<'de, D>(deserializer: D) -> Result<BTreeMap<String, Worker>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = lenient_object(deserializer)?;
    Ok(entries
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value::<Worker>(value) {
            Ok(worker) => Some((id, worker)),
            Err(err) => {
                warn!(worker = %id, error = %err, "skipping undecodable worker");
                None
            }
        })
        .collect())
}

/// Only a JSON boolean counts as a health report; anything else is unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

impl Health {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Health::Healthy,
            Value::Bool(false) => Health::Unhealthy,
            _ => Health::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Health::Unknown)
    }
}

fn deserialize_health<'de, D>(deserializer: D) -> Result<Health, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Health::from_value(&value))
}

/// Quantities plus the two computed fields shown in the table.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DerivedQuantities {
    pub total: Option<f64>,
    pub allocatable: Option<f64>,
    pub used: Option<f64>,
    pub preemptable: Option<f64>,
    /// `total - allocatable`, not clamped.
    pub unschedulable: f64,
    /// `allocatable - used`, not clamped.
    pub available: f64,
}

impl From<&Quantities> for DerivedQuantities {
    fn from(raw: &Quantities) -> Self {
        let total = raw.total.unwrap_or(0.0);
        let allocatable = raw.allocatable.unwrap_or(0.0);
        let used = raw.used.unwrap_or(0.0);
        Self {
            total: raw.total,
            allocatable: raw.allocatable,
            used: raw.used,
            preemptable: raw.preemptable,
            unschedulable: total - allocatable,
            available: allocatable - used,
        }
    }
}

/// One display row of the workers table.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerRow {
    pub id: String,
    pub ip: Option<String>,
    pub worker_type: Option<String>,
    pub healthy: Health,
    pub status: BTreeMap<String, DerivedQuantities>,
    pub gpu_utilization: Option<f64>,
}

/// Prometheus instant-query response body.
#[derive(Clone, Debug, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueryData {
    #[serde(default)]
    pub result: Vec<Sample>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Sample {
    pub metric: SampleMetric,
    /// `[unix seconds, "<numeric string>"]`
    pub value: (f64, String),
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SampleMetric {
    #[serde(default)]
    pub instance: Option<String>,
}

/// A decoded metrics result together with when it was taken.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsSnapshot {
    pub samples: Vec<Sample>,
    pub fetched_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Newest sample timestamp in the result, if any.
    pub fn sampled_at(&self) -> Option<DateTime<Utc>> {
        self.samples
            .iter()
            .map(|s| s.value.0)
            .fold(None, |acc: Option<f64>, ts| Some(acc.map_or(ts, |a| a.max(ts))))
            .and_then(|ts| {
                let secs = ts.trunc() as i64;
                let nanos = (ts.fract() * 1e9) as u32;
                DateTime::from_timestamp(secs, nanos)
            })
    }
}
