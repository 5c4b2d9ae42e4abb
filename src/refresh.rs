//! Background polling of the cluster document and the GPU metrics.
//!
//! Each source runs in its own tokio task and publishes on a `watch`
//! channel. The UI loop only ever looks at the newest value.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::cluster::ClusterSource;
use crate::models::{ClusterData, MetricsSnapshot};
use crate::prometheus::{fetch_snapshot, gpu_utilization_query};

/// A value tagged with a counter that increases on every publish.
#[derive(Debug)]
pub struct Revisioned<T> {
    pub revision: u64,
    pub value: Arc<T>,
}

impl<T> Clone for Revisioned<T> {
    fn clone(&self) -> Self {
        Self {
            revision: self.revision,
            value: Arc::clone(&self.value),
        }
    }
}

pub type Slot<T> = Option<Revisioned<T>>;

pub struct Refresher {
    cluster: watch::Receiver<Slot<ClusterData>>,
    metrics: watch::Receiver<Slot<MetricsSnapshot>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Refresher {
    pub fn spawn(
        client: Client,
        source: ClusterSource,
        team: &str,
        cluster_every: Duration,
        metrics_every: Duration,
    ) -> Self {
        let (cluster_tx, cluster_rx) = watch::channel(None);
        let (metrics_tx, metrics_rx) = watch::channel(None);

        let query = gpu_utilization_query(team);
        let tasks = vec![
            tokio::spawn(poll_cluster(
                client.clone(),
                source,
                cluster_every,
                cluster_tx,
            )),
            tokio::spawn(poll_metrics(
                client,
                query,
                metrics_every,
                cluster_rx.clone(),
                metrics_tx,
            )),
        ];

        Self {
            cluster: cluster_rx,
            metrics: metrics_rx,
            tasks,
        }
    }

    /// Newest cluster document, if one arrived since the last call.
    pub fn latest_cluster(&mut self) -> Option<Revisioned<ClusterData>> {
        take_changed(&mut self.cluster).flatten()
    }

    /// Newest metrics slot, if it changed since the last call. `Some(None)`
    /// means the last fetch failed and earlier utilization no longer holds.
    pub fn latest_metrics(&mut self) -> Option<Slot<MetricsSnapshot>> {
        take_changed(&mut self.metrics)
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn take_changed<T>(rx: &mut watch::Receiver<Slot<T>>) -> Option<Slot<T>> {
    if !rx.has_changed().unwrap_or(false) {
        return None;
    }
    Some(rx.borrow_and_update().clone())
}

async fn poll_cluster(
    client: Client,
    source: ClusterSource,
    every: Duration,
    tx: watch::Sender<Slot<ClusterData>>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut revision = 0;

    loop {
        ticker.tick().await;
        match source.load(&client).await {
            Ok(data) => {
                let unchanged = tx
                    .borrow()
                    .as_ref()
                    .is_some_and(|current| *current.value == data);
                if unchanged {
                    continue;
                }
                revision += 1;
                info!(revision, workers = data.workers.len(), "cluster data updated");
                let published = Revisioned {
                    revision,
                    value: Arc::new(data),
                };
                if tx.send(Some(published)).is_err() {
                    break;
                }
            }
            Err(err) => warn!(source = %source.describe(), error = %err, "cluster refresh failed"),
        }
    }
}

async fn poll_metrics(
    client: Client,
    query: String,
    every: Duration,
    mut cluster: watch::Receiver<Slot<ClusterData>>,
    tx: watch::Sender<Slot<MetricsSnapshot>>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut revision = 0;

    loop {
        ticker.tick().await;
        let grafana = cluster
            .borrow_and_update()
            .as_ref()
            .and_then(|c| c.value.config.grafana.clone());

        let Some(grafana) = grafana else {
            // No Grafana yet; sleep until the cluster document changes.
            if cluster.changed().await.is_err() {
                break;
            }
            ticker.reset_immediately();
            continue;
        };

        match fetch_snapshot(&client, &grafana, &query).await {
            Ok(snapshot) => {
                revision += 1;
                let published = Revisioned {
                    revision,
                    value: Arc::new(snapshot),
                };
                if tx.send(Some(published)).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(%grafana, error = %err, "metrics refresh failed");
                // Only wake the UI when there was something to clear.
                tx.send_if_modified(|slot| slot.take().is_some());
            }
        }
    }
}
