//! HTTP surface for the monitor: a manual poll trigger and a status report.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tracing::info;

use crate::error::CycleError;
use crate::poller::Poller;
use crate::types::{CycleReport, PollStatus};

#[derive(Serialize)]
struct ForcePollResponse {
    status: &'static str,
    #[serde(flatten)]
    report: CycleReport,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

/// GET /force-poll — run one poll cycle on demand.
async fn force_poll_handler(
    State(poller): State<Arc<Poller>>,
) -> Result<Json<ForcePollResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("Manual poll triggered");
    match poller.run_cycle().await {
        Ok(report) => Ok(Json(ForcePollResponse {
            status: "Polling completed",
            report,
        })),
        Err(e @ CycleError::InFlight) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Polling already in flight",
                message: e.to_string(),
            }),
        )),
        Err(CycleError::Fetch(e)) => Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: "Polling failed",
                message: e.to_string(),
            }),
        )),
    }
}

/// GET /polling-status — whether polling is enabled, the interval, and how
/// many listings are tracked.
async fn polling_status_handler(State(poller): State<Arc<Poller>>) -> Json<PollStatus> {
    Json(poller.status())
}

/// Build the router over a shared poller handle.
pub fn create_router(poller: Arc<Poller>) -> Router {
    Router::new()
        .route("/force-poll", get(force_poll_handler))
        .route("/polling-status", get(polling_status_handler))
        .with_state(poller)
}

/// Bind and serve the trigger/status endpoints.
pub async fn serve(poller: Arc<Poller>, port: u16) -> anyhow::Result<()> {
    let app = create_router(poller);
    let addr = format!("0.0.0.0:{port}");
    info!("Trigger/status endpoints listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SparkClient;
    use crate::config::{NotificationsConfig, SlackConfig};
    use crate::notify::Dispatcher;
    use crate::store::SnapshotStore;
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn spawn_app(spark_uri: &str) -> String {
        let client = SparkClient::new(spark_uri, "test-token", 100).unwrap();
        let dispatcher = Dispatcher::from_config(&NotificationsConfig {
            slack: Some(SlackConfig {
                webhook_url: format!("{spark_uri}/webhook"),
            }),
            twilio: None,
        })
        .unwrap();
        let poller = Arc::new(Poller::new(
            client,
            dispatcher,
            SnapshotStore::new(),
            Duration::from_secs(120),
            true,
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(poller);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn force_poll_then_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "D": { "Success": true, "Results": [{
                    "Id": "L1",
                    "StandardFields": {
                        "StandardStatus": "Active",
                        "ListPrice": 500000,
                        "ModificationTimestamp": "2025-03-14T09:26:53Z"
                    }
                }] }
            })))
            .mount(&server)
            .await;

        let base = spawn_app(&server.uri()).await;

        let body: Value = reqwest::get(format!("{base}/force-poll"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "Polling completed");
        assert_eq!(body["listings_fetched"], 1);
        assert_eq!(body["new_listings"], 1);
        assert_eq!(body["events_dispatched"], 0);

        let status: Value = reqwest::get(format!("{base}/polling-status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["polling_enabled"], true);
        assert_eq!(status["poll_interval_secs"], 120);
        assert_eq!(status["tracked_listings"], 1);
        assert_eq!(status["cycles_completed"], 1);
    }

    #[tokio::test]
    async fn force_poll_fetch_failure_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/listings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let base = spawn_app(&server.uri()).await;

        let response = reqwest::get(format!("{base}/force-poll")).await.unwrap();
        assert_eq!(response.status().as_u16(), 502);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Polling failed");
    }
}
