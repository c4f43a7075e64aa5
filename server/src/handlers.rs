//! The stateless HTTP sync surface. Every handler reads the shared
//! transcript or submits through the dispatcher; the server keeps no
//! per-client state, so clients resume purely from the sequence number.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tidepool_core::{
    CommandRequest, CommandResponse, ErrorResponse, PollSeqResponse, StatusResponse, Transcript,
};
use time::format_description::well_known::Rfc3339;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, SubmitError};

#[derive(Clone)]
pub struct AppState {
    pub transcript: Arc<Transcript>,
    pub dispatcher: Dispatcher,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/pollseq", get(poll_sequence))
        .route("/output", get(full_output))
        .route("/command", post(command))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// GET /status - liveness probe plus the current sequence.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        sequence: state.transcript.current_sequence(),
        ok: true,
    })
}

/// GET /pollseq - the lightweight poll check.
async fn poll_sequence(State(state): State<AppState>) -> Json<PollSeqResponse> {
    Json(PollSeqResponse {
        sequence: state.transcript.current_sequence(),
    })
}

/// GET /output - full transcript as plain text. Delta computation happens
/// client-side by line count, so this is a single snapshot read.
async fn full_output(State(state): State<AppState>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        state.transcript.render(),
    )
}

/// POST /command - submit a command and wait for its outcome (or the soft
/// timeout). Malformed bodies never reach the dispatcher.
async fn command(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            debug!(%rejection, "rejecting malformed command body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "malformed command body".to_string(),
                }),
            )
                .into_response();
        }
    };

    match state.dispatcher.submit(request.cmd).await {
        Ok(output) => {
            let ts = output
                .completed_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| String::new());
            Json(CommandResponse {
                out: output.joined(),
                seq: output.sequence,
                ts,
            })
            .into_response()
        }
        Err(SubmitError::Busy) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "busy".to_string(),
            }),
        )
            .into_response(),
        Err(SubmitError::Closed) => {
            warn!("command submitted while dispatcher is shutting down");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "shutting down".to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::shell::BuiltinShell;
    use axum::body::{self, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::util::ServiceExt;

    fn test_app() -> (Arc<Transcript>, Router) {
        let transcript = Arc::new(Transcript::new());
        let (dispatcher, _worker) = Dispatcher::spawn(
            Arc::clone(&transcript),
            Arc::new(BuiltinShell::new()),
            DispatchConfig::default(),
        );
        let app = build_router(AppState {
            transcript: Arc::clone(&transcript),
            dispatcher,
        });
        (transcript, app)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(app: &Router, uri: &str) -> T {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn post_command(app: &Router, body: String) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/command")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn status_reports_sequence_and_ok() {
        let (transcript, app) = test_app();
        transcript.append(["hello"]);

        let status: StatusResponse = get_json(&app, "/status").await;
        assert!(status.ok);
        assert_eq!(status.sequence, 1);
    }

    #[tokio::test]
    async fn calc_command_advances_the_sequence_by_exactly_two() {
        let (_transcript, app) = test_app();

        let before: PollSeqResponse = get_json(&app, "/pollseq").await;
        assert_eq!(before.sequence, 0);

        let (status, bytes) = post_command(&app, json!({"cmd": "calc 2+2"}).to_string()).await;
        assert_eq!(status, StatusCode::OK);
        let reply: CommandResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(reply.out.contains('4'), "out was {:?}", reply.out);
        assert_eq!(reply.seq, 2);
        assert!(!reply.ts.is_empty());

        let after: PollSeqResponse = get_json(&app, "/pollseq").await;
        assert_eq!(after.sequence, before.sequence + 2);
    }

    #[tokio::test]
    async fn malformed_command_body_is_a_400_and_leaves_no_trace() {
        let (transcript, app) = test_app();

        let (status, _) = post_command(&app, "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_command(&app, json!({"nope": 1}).to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(transcript.current_sequence(), 0);
    }

    #[tokio::test]
    async fn output_serves_the_full_transcript_as_plain_text() {
        let (transcript, app) = test_app();
        transcript.append(["> echo hi", "hi"]);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/output").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("> echo hi"));
    }

    #[tokio::test]
    async fn polling_twice_with_no_appends_is_idempotent() {
        let (transcript, app) = test_app();
        transcript.append(["line"]);

        let first: PollSeqResponse = get_json(&app, "/pollseq").await;
        let second: PollSeqResponse = get_json(&app, "/pollseq").await;
        assert_eq!(first.sequence, second.sequence);
    }
}
