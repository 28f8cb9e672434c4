//! HTTP front end of [`EvdService`]
//!
//! Bodies are framed protocol messages (`application/octet-stream`). Error
//! replies keep the framing and map their kind onto the status code.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, MethodRouter},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::error::{validation_err, ErrorKind};

use super::protocol::{decode_message, encode_message, OpCode, Reply, Request};
use super::service::EvdService;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    degree: usize,
    collections: usize,
}

/// Router with every collection endpoint.
///
/// Key uploads run to hundreds of megabytes at production degree, so the
/// default body limit is lifted.
pub fn router(service: Arc<EvdService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/collections/setup", endpoint(OpCode::Setup))
        .route("/collections/insert", endpoint(OpCode::Insert))
        .route("/collections/query", endpoint(OpCode::Query))
        .route("/collections/query_ptxt", endpoint(OpCode::QueryPlain))
        .route("/collections/retrieve", endpoint(OpCode::Retrieve))
        .route("/collections/pir_retrieve", endpoint(OpCode::PirRetrieve))
        .route("/collections/:name", delete(drop_collection))
        .route("/terminate", endpoint(OpCode::Terminate))
        .layer(DefaultBodyLimit::disable())
        .with_state(service)
}

fn endpoint(op: OpCode) -> MethodRouter<Arc<EvdService>> {
    post(move |state: State<Arc<EvdService>>, body: Bytes| framed(state, body, op))
}

/// Status code for a reply
pub fn status_for(reply: &Reply) -> StatusCode {
    match reply {
        Reply::Error { kind, .. } => match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Resource => StatusCode::NOT_FOUND,
            ErrorKind::CryptoState => StatusCode::CONFLICT,
            ErrorKind::Network => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::OK,
    }
}

async fn health_check(State(service): State<Arc<EvdService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        degree: service.params().degree,
        collections: service.collection_count(),
    })
}

async fn framed(State(service): State<Arc<EvdService>>, body: Bytes, op: OpCode) -> Response {
    let degree = service.params().degree;
    let reply = match decode_message::<Request>(&body, degree) {
        Ok(request) if request.op() != op => Reply::from(validation_err!(
            "{:?} request sent to the {:?} endpoint",
            request.op(),
            op
        )),
        Ok(request) => run(service, request).await,
        Err(err) => Reply::from(err),
    };
    respond(&reply, degree)
}

async fn drop_collection(
    State(service): State<Arc<EvdService>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let degree = service.params().degree;
    let reply = match decode_message::<Request>(&body, degree) {
        Ok(Request::DropCollection { name: framed_name }) if framed_name == name => {
            run(service, Request::DropCollection { name }).await
        }
        Ok(_) => Reply::from(validation_err!("body does not drop collection {:?}", name)),
        Err(err) => Reply::from(err),
    };
    respond(&reply, degree)
}

async fn run(service: Arc<EvdService>, request: Request) -> Reply {
    tokio::task::spawn_blocking(move || service.handle(request))
        .await
        .unwrap_or_else(|e| {
            warn!("request handler panicked: {}", e);
            Reply::Error {
                kind: ErrorKind::Network,
                message: "request handler failed".to_string(),
            }
        })
}

fn respond(reply: &Reply, degree: usize) -> Response {
    match encode_message(reply, degree) {
        Ok(bytes) => (
            status_for(reply),
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!("failed to encode reply: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
