//! GPU utilization queries through the Grafana datasource proxy.

use chrono::Utc;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{MetricsSnapshot, QueryResponse};

/// PromQL expression averaging task GPU usage per scrape target of a team.
pub fn gpu_utilization_query(team: &str) -> String {
    format!("avg(task_gpu_percent{{vc_name=\"{team}\"}}) by (instance)")
}

/// Instant-query endpoint behind Grafana's first datasource.
pub fn query_url(grafana_base: &str) -> String {
    format!(
        "{}/api/datasources/proxy/1/api/v1/query",
        grafana_base.trim_end_matches('/')
    )
}

/// Turns a decoded response into a snapshot, rejecting failed queries.
pub fn snapshot_from_response(response: QueryResponse) -> Result<MetricsSnapshot> {
    if response.status != "success" {
        return Err(Error::Prometheus(
            response.error.unwrap_or_else(|| response.status.clone()),
        ));
    }
    let samples = response.data.map(|data| data.result).unwrap_or_default();
    Ok(MetricsSnapshot {
        samples,
        fetched_at: Utc::now(),
    })
}

pub async fn fetch_snapshot(client: &Client, grafana_base: &str, query: &str) -> Result<MetricsSnapshot> {
    let url = query_url(grafana_base);
    let resp = client.get(&url).query(&[("query", query)]).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Status { url, status });
    }
    let response: QueryResponse = resp.json().await?;
    let snapshot = snapshot_from_response(response)?;
    debug!(samples = snapshot.samples.len(), "metrics snapshot fetched");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{client, serve, Reply};

    #[test]
    fn test_gpu_utilization_query() {
        assert_eq!(
            gpu_utilization_query("platform"),
            r#"avg(task_gpu_percent{vc_name="platform"}) by (instance)"#
        );
    }

    #[test]
    fn test_query_url_trims_trailing_slash() {
        assert_eq!(
            query_url("http://grafana:3000/"),
            "http://grafana:3000/api/datasources/proxy/1/api/v1/query"
        );
        assert_eq!(
            query_url("http://grafana:3000"),
            "http://grafana:3000/api/datasources/proxy/1/api/v1/query"
        );
    }

    #[test]
    fn test_snapshot_from_success_response() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"status": "success", "data": {"resultType": "vector", "result": [
                {"metric": {"instance": "10.0.0.5:9100"}, "value": [1700000000.1, "55.5"]}
            ]}}"#,
        )
        .unwrap();
        let snapshot = snapshot_from_response(response).unwrap();
        assert_eq!(snapshot.samples.len(), 1);
        assert_eq!(snapshot.samples[0].value.1, "55.5");
        assert_eq!(
            snapshot.samples[0].metric.instance.as_deref(),
            Some("10.0.0.5:9100")
        );
    }

    #[test]
    fn test_snapshot_from_empty_result() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"status": "success", "data": {"resultType": "vector", "result": []}}"#,
        )
        .unwrap();
        assert!(snapshot_from_response(response).unwrap().samples.is_empty());
    }

    #[test]
    fn test_snapshot_from_error_response() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"status": "error", "errorType": "bad_data", "error": "parse error"}"#,
        )
        .unwrap();
        match snapshot_from_response(response) {
            Err(Error::Prometheus(message)) => assert_eq!(message, "parse error"),
            other => panic!("unexpected result: {:?}", other.map(|s| s.samples.len())),
        }
    }

    #[tokio::test]
    async fn test_fetch_snapshot_sends_query_through_proxy() {
        let mut server = serve(vec![Reply::json(
            r#"{"status": "success", "data": {"resultType": "vector", "result": [
                {"metric": {"instance": "10.0.0.5:9100"}, "value": [1700000000, "12.5"]}
            ]}}"#,
        )])
        .await;

        let query = gpu_utilization_query("platform");
        let snapshot = fetch_snapshot(&client(), &server.url, &query)
            .await
            .unwrap();
        assert_eq!(snapshot.samples.len(), 1);
        assert_eq!(snapshot.samples[0].value.1, "12.5");

        let request = server.requests.recv().await.unwrap();
        let target = request.split_whitespace().nth(1).unwrap();
        let url = reqwest::Url::parse(&format!("http://localhost{target}")).unwrap();
        assert_eq!(url.path(), "/api/datasources/proxy/1/api/v1/query");
        let sent: Vec<_> = url.query_pairs().collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "query");
        assert_eq!(
            sent[0].1,
            r#"avg(task_gpu_percent{vc_name="platform"}) by (instance)"#
        );
    }

    #[tokio::test]
    async fn test_fetch_snapshot_server_error_is_status_error() {
        let server = serve(vec![Reply::status(500)]).await;
        let result = fetch_snapshot(&client(), &server.url, "up").await;
        match result {
            Err(Error::Status { url, status }) => {
                assert_eq!(status.as_u16(), 500);
                assert!(url.ends_with("/api/datasources/proxy/1/api/v1/query"));
            }
            other => panic!("unexpected result: {:?}", other.map(|s| s.samples.len())),
        }
    }
}
