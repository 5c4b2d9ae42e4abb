use std::path::PathBuf;

use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::ClusterData;

/// Where the `{config, types, workers}` document comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterSource {
    File(PathBuf),
    Http(String),
}

impl ClusterSource {
    pub async fn load(&self, client: &Client) -> Result<ClusterData> {
        let data: ClusterData = match self {
            ClusterSource::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                serde_json::from_slice(&bytes)?
            }
            ClusterSource::Http(url) => {
                let resp = client.get(url).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(Error::Status {
                        url: url.clone(),
                        status,
                    });
                }
                resp.json().await?
            }
        };
        debug!(
            workers = data.workers.len(),
            types = data.types.len(),
            "cluster data loaded"
        );
        Ok(data)
    }

    pub fn describe(&self) -> String {
        match self {
            ClusterSource::File(path) => path.display().to_string(),
            ClusterSource::Http(url) => url.clone(),
        }
    }
}
