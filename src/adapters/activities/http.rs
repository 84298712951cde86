//! HTTP collaborator client for the repair activities.
//!
//! Every activity is a `POST {base_url}/activities/{name}` carrying the
//! context as JSON. Response classification:
//! - 2xx with a JSON body is the activity result
//! - 408, 429, 5xx and connection errors are transient
//! - any other status, or a body that is not JSON, is non-retryable

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::models::{CollaboratorConfig, ProcessContext};
use crate::domain::ports::{ActivityError, ActivityKind, ActivityResult, Heartbeat, RepairActivities};

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

pub struct HttpActivities {
    http_client: ReqwestClient,
    base_url: String,
    heartbeat_interval: Duration,
}

impl HttpActivities {
    pub fn new(config: &CollaboratorConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            heartbeat_interval: config.heartbeat_interval().max(MIN_HEARTBEAT_INTERVAL),
        })
    }

    pub fn endpoint(&self, kind: ActivityKind) -> String {
        format!("{}/activities/{}", self.base_url, kind)
    }

    /// Send one activity request, heartbeating while it is in flight.
    #[instrument(skip(self, context, heartbeat), fields(activity = %kind))]
    async fn call(
        &self,
        kind: ActivityKind,
        context: ProcessContext,
        heartbeat: Heartbeat,
    ) -> ActivityResult {
        let url = self.endpoint(kind);
        debug!("POST {}", url);

        let request = self.http_client.post(&url).json(&context).send();
        tokio::pin!(request);
        let mut ticker = tokio::time::interval(self.heartbeat_interval);

        let response = loop {
            tokio::select! {
                response = &mut request => break response,
                _ = ticker.tick() => heartbeat.beat(format!("Waiting for {kind} response...")),
            }
        };

        let response = response.map_err(classify_transport_error)?;
        handle_response(kind, response).await
    }
}

fn classify_transport_error(err: reqwest::Error) -> ActivityError {
    warn!(error = %err, "Collaborator request failed");
    if err.is_builder() {
        ActivityError::non_retryable(format!("invalid request: {err}"))
    } else {
        ActivityError::transient(format!("network error: {err}"))
    }
}

async fn handle_response(kind: ActivityKind, response: Response) -> ActivityResult {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| ActivityError::transient(format!("failed to read {kind} response: {err}")))?;

    if !status.is_success() {
        warn!(activity = %kind, status = %status, "Collaborator returned an error");
        return Err(classify_status(status, body));
    }

    serde_json::from_str::<Value>(&body).map_err(|err| {
        ActivityError::non_retryable(format!("{kind} response is not valid JSON: {err}"))
    })
}

fn classify_status(status: StatusCode, body: String) -> ActivityError {
    let message = format!("collaborator returned {status}: {body}");
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ActivityError::transient(message)
        }
        status if status.is_server_error() => ActivityError::transient(message),
        _ => ActivityError::non_retryable(message),
    }
}

#[async_trait]
impl RepairActivities for HttpActivities {
    async fn detect(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.call(ActivityKind::Detect, context, heartbeat).await
    }

    async fn analyze(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.call(ActivityKind::Analyze, context, heartbeat).await
    }

    async fn plan(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.call(ActivityKind::Plan, context, heartbeat).await
    }

    async fn notify(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.call(ActivityKind::Notify, context, heartbeat).await
    }

    async fn execute_repairs(
        &self,
        context: ProcessContext,
        heartbeat: Heartbeat,
    ) -> ActivityResult {
        self.call(ActivityKind::ExecuteRepairs, context, heartbeat).await
    }

    async fn report(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.call(ActivityKind::Report, context, heartbeat).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND, String::new()).is_retryable());
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let config = CollaboratorConfig {
            base_url: "http://collaborator:8080/".to_string(),
            ..Default::default()
        };
        let activities = HttpActivities::new(&config).unwrap();
        assert_eq!(
            activities.endpoint(ActivityKind::ExecuteRepairs),
            "http://collaborator:8080/activities/execute_repairs"
        );
    }
}
