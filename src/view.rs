//! Projection of raw cluster and metrics inputs into table rows.
//!
//! Everything here is pure: the functions take borrowed inputs and build new
//! rows, so the cluster snapshot held by the refresher is never touched.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::models::{DerivedQuantities, MetricsSnapshot, Worker, WorkerRow};

/// Wire value of the "no filter" option.
pub const ALL_TYPES: &str = "__all__";

/// GPU utilization keyed by worker address.
pub type UtilizationMap = HashMap<String, f64>;

/// Address portion of a `<ip>:<port>` instance label.
pub fn instance_address(instance: &str) -> &str {
    instance.split(':').next().unwrap_or(instance)
}

/// Builds the address → utilization map from a metrics snapshot.
///
/// A missing snapshot is "no data", not an error.
pub fn utilization_by_instance(snapshot: Option<&MetricsSnapshot>) -> UtilizationMap {
    let mut map = UtilizationMap::new();
    let Some(snapshot) = snapshot else {
        return map;
    };

    for sample in &snapshot.samples {
        let Some(instance) = sample.metric.instance.as_deref() else {
            continue;
        };
        match sample.value.1.trim().parse::<f64>() {
            Ok(value) => {
                map.insert(instance_address(instance).to_string(), value);
            }
            Err(_) => warn!(instance, value = %sample.value.1, "unparseable gpu utilization sample"),
        }
    }
    map
}

/// Turns the worker inventory into display rows.
pub fn derive_rows(
    workers: &BTreeMap<String, Worker>,
    utilization: &UtilizationMap,
    filter: &TypeFilter,
) -> Vec<WorkerRow> {
    workers
        .iter()
        .filter(|(_, worker)| filter.matches(worker))
        .map(|(id, worker)| WorkerRow {
            id: id.clone(),
            ip: worker.ip.clone(),
            worker_type: worker.worker_type.clone(),
            healthy: worker.healthy,
            status: worker
                .status
                .iter()
                .map(|(name, raw)| (name.clone(), DerivedQuantities::from(raw)))
                .collect(),
            gpu_utilization: worker
                .ip
                .as_deref()
                .and_then(|ip| utilization.get(ip).copied()),
        })
        .collect()
}

/// Worker type selection for the table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TypeFilter {
    #[default]
    All,
    Type(String),
}

impl TypeFilter {
    pub fn parse(value: &str) -> Self {
        if value == ALL_TYPES || value.eq_ignore_ascii_case("all") {
            TypeFilter::All
        } else {
            TypeFilter::Type(value.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TypeFilter::All => "All",
            TypeFilter::Type(name) => name,
        }
    }

    pub fn matches(&self, worker: &Worker) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Type(name) => worker.worker_type.as_deref() == Some(name.as_str()),
        }
    }

    /// "All" followed by every known type, in key order.
    pub fn options(types: &BTreeMap<String, Value>) -> Vec<TypeFilter> {
        std::iter::once(TypeFilter::All)
            .chain(types.keys().map(|name| TypeFilter::Type(name.clone())))
            .collect()
    }

    pub fn next(&self, types: &BTreeMap<String, Value>) -> TypeFilter {
        self.step(types, 1)
    }

    pub fn previous(&self, types: &BTreeMap<String, Value>) -> TypeFilter {
        let len = types.len() + 1;
        self.step(types, len - 1)
    }

    // A filter whose type vanished from `types` steps back onto "All".
    fn step(&self, types: &BTreeMap<String, Value>, offset: usize) -> TypeFilter {
        let options = Self::options(types);
        match options.iter().position(|option| option == self) {
            Some(index) => options[(index + offset) % options.len()].clone(),
            None => TypeFilter::All,
        }
    }
}

/// Single-entry cache that recomputes only when its key changes.
#[derive(Debug)]
pub struct Memo<K, V> {
    entry: Option<(K, V)>,
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn new() -> Self {
        Self { entry: None }
    }

    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> &V {
        let entry = match self.entry.take() {
            Some((cached, value)) if cached == key => (cached, value),
            _ => (key, compute()),
        };
        &self.entry.insert(entry).1
    }

    pub fn get(&self) -> Option<&V> {
        self.entry.as_ref().map(|(_, value)| value)
    }
}

impl<K: PartialEq, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
