use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser};

use crate::cluster::ClusterSource;
use crate::view::{TypeFilter, ALL_TYPES};

#[derive(Debug, Parser)]
#[command(name = "gpu-workers")]
#[command(about = "Terminal dashboard of cluster workers and their GPU utilization", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Team (virtual cluster) whose GPU usage is queried
    #[arg(long, env = "GPU_WORKERS_TEAM")]
    pub team: String,

    /// Seconds between GPU utilization queries
    #[arg(long, default_value_t = 10)]
    pub refresh_secs: u64,

    /// Seconds between cluster data reloads
    #[arg(long, default_value_t = 30)]
    pub cluster_refresh_secs: u64,

    /// Initial worker type filter
    #[arg(long = "type", default_value = ALL_TYPES)]
    pub worker_type: String,

    /// Write tracing output to this file (filter with RUST_LOG)
    #[arg(long, env = "GPU_WORKERS_LOG")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, ClapArgs)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// URL returning the cluster document ({config, types, workers})
    #[arg(long, env = "GPU_WORKERS_CLUSTER_URL")]
    pub cluster_url: Option<String>,

    /// Local JSON file holding the cluster document
    #[arg(long)]
    pub cluster_file: Option<PathBuf>,
}

impl Args {
    pub fn cluster_source(&self) -> Option<ClusterSource> {
        match (&self.source.cluster_url, &self.source.cluster_file) {
            (Some(url), _) => Some(ClusterSource::Http(url.clone())),
            (None, Some(path)) => Some(ClusterSource::File(path.clone())),
            (None, None) => None,
        }
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn cluster_interval(&self) -> Duration {
        Duration::from_secs(self.cluster_refresh_secs.max(1))
    }

    pub fn initial_filter(&self) -> TypeFilter {
        TypeFilter::parse(&self.worker_type)
    }
}
