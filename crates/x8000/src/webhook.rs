//! Webhook listener for C2C push notifications.
//!
//! The cloud POSTs event batches to `/api/webhook/{id}`. Bodies are
//! handed to the push receiver untouched; parsing and merging happen on
//! the coordinator's task.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use tracing::{debug, info, warn};

use x8000_core::{PushOutcome, PushReceiver};

#[derive(Clone)]
struct WebhookState {
    webhook_id: Arc<str>,
    receiver: PushReceiver,
}

/// Router serving one webhook id.
pub fn router(webhook_id: &str, receiver: PushReceiver) -> Router {
    Router::new()
        .route("/api/webhook/{id}", post(receive))
        .with_state(WebhookState {
            webhook_id: Arc::from(webhook_id),
            receiver,
        })
}

async fn receive(
    State(state): State<WebhookState>,
    Path(id): Path<String>,
    body: Bytes,
) -> StatusCode {
    if id != *state.webhook_id {
        debug!(%id, "push for an unknown webhook id");
        return StatusCode::NOT_FOUND;
    }
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        warn!(bytes = body.len(), "push body is not JSON");
        return StatusCode::BAD_REQUEST;
    }

    match state.receiver.on_push(&body) {
        PushOutcome::Queued(items) => info!(items, "push received"),
        PushOutcome::Discarded => debug!("push discarded"),
    }
    StatusCode::OK
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "webhook listener started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use x8000_core::{AccountConfig, Coordinator, CoordinatorConfig, Fleet, FleetEntry};

    fn app() -> Router {
        let secret = || SecretString::from("x".to_string());
        let account = AccountConfig::new("client", secret(), secret(), secret()).unwrap();
        let fleet = Fleet::new([FleetEntry::new("sala", "p1", "Sala")]).unwrap();
        let coordinator =
            Coordinator::from_account(&account, CoordinatorConfig::default(), fleet).unwrap();
        router("hook-1", coordinator.push_receiver())
    }

    fn post_to(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    const EVENT: &str = r#"[{"data":{"chronothermostats":[{"mode":"automatic","function":"heating","sender":{"plant":{"id":"p1","module":{"id":"sala"}}}}]}}]"#;

    #[tokio::test]
    async fn accepts_events_for_our_id() {
        let response = app().oneshot(post_to("/api/webhook/hook-1", EVENT)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let response = app().oneshot(post_to("/api/webhook/other", EVENT)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_json_is_rejected() {
        let response = app()
            .oneshot(post_to("/api/webhook/hook-1", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn json_without_events_is_acknowledged() {
        let response = app()
            .oneshot(post_to("/api/webhook/hook-1", r#"{"validationCode":"abc"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn only_post_is_routed() {
        let request = Request::builder()
            .uri("/api/webhook/hook-1")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
