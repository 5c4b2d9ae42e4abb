use crate::columns::{format_quantity, format_utilization, ResourceKind};
use crate::models::WorkerRow;

/// Grafana node-status dashboard for one worker address.
pub fn node_status_url(grafana_base: &str, ip: &str) -> String {
    format!("{grafana_base}/dashboard/db/node-status?orgId=1&var-node={ip}")
}

/// Content of the expanded panel under a table row.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailPanel {
    pub worker: String,
    pub dashboard_url: Option<String>,
    /// `(resource, [(kind, formatted value)])`
    pub resources: Vec<(String, Vec<(ResourceKind, String)>)>,
    pub gpu_utilization: String,
}

impl DetailPanel {
    pub fn for_row(row: &WorkerRow, grafana_base: Option<&str>) -> Self {
        let dashboard_url = grafana_base
            .zip(row.ip.as_deref())
            .map(|(base, ip)| node_status_url(base, ip));

        let resources = row
            .status
            .iter()
            .map(|(name, quantities)| {
                let values = ResourceKind::ALL
                    .iter()
                    .map(|kind| {
                        let text = kind.value(quantities).map(format_quantity);
                        (*kind, text.unwrap_or_else(|| "-".to_string()))
                    })
                    .collect();
                (name.clone(), values)
            })
            .collect();

        Self {
            worker: row.id.clone(),
            dashboard_url,
            resources,
            gpu_utilization: format_utilization(row.gpu_utilization),
        }
    }
}
