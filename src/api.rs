//! HTTP surface for a CAN node (spec.md §6).
//!
//! Handlers are thin: derive the caller's identity where needed, delegate
//! to [`CanNode`], and shape the result into the wire envelope. KV and
//! neighbor-map preconditions are surfaced in-band as a 200 `{message}`
//! body per spec.md §7's propagation policy; only malformed JSON escapes
//! as a non-2xx response.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::CanError;
use crate::node::{CanNode, DataOp};
use crate::region::Host;
use crate::wire;

#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<CanNode>,
}

/// A request body that failed to decode as JSON. Turned into a 500 per
/// spec.md §7 ("malformed inputs ... return HTTP 5xx via the standard
/// error path") — a deliberate departure from the usual 400, funneling
/// every handler-side failure through one error path.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<S, T> axum::extract::FromRequest<S> for ValidatedJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => Err(malformed_response(rejection)),
        }
    }
}

fn malformed_response(rejection: JsonRejection) -> Response {
    let body = wire::ErrorResponse::new(CanError::Malformed(rejection.to_string()).message());
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Always-200 envelope for KV/neighbor-map operations: success shape on
/// one side, `{message}` on the other, exactly how the source surfaces
/// handler failures in-band.
#[derive(Serialize)]
#[serde(untagged)]
enum InBand<T> {
    Ok(T),
    Err(wire::ErrorResponse),
}

impl<T: Serialize> IntoResponse for InBand<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

fn in_band<T: Serialize>(result: Result<T, CanError>) -> InBand<T> {
    match result {
        Ok(value) => InBand::Ok(value),
        Err(e) => InBand::Err(wire::ErrorResponse::new(e.message())),
    }
}

/// Errors that escape the in-band envelope (JOIN, TRACE): these operations
/// have no `{message}`-shaped failure variant of their own success schema,
/// so a genuine failure is a 500.
impl IntoResponse for CanError {
    fn into_response(self) -> Response {
        let body = wire::ErrorResponse::new(self.message());
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Derive a peer's identity from the transport-layer remote address plus a
/// body/query-supplied listening port (spec.md §4.7). `[::1]` is
/// normalized to `localhost` so loopback peers agree on one spelling.
fn host_from_remote(remote: SocketAddr, port: u16) -> Host {
    let ip = match remote.ip() {
        IpAddr::V6(v6) if v6.to_string() == "::1" => "localhost".to_string(),
        ip => ip.to_string(),
    };
    Host::new(ip, port)
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/join", post(join).options(|| allow("OPTIONS, POST")))
        .route("/debug", get(debug).options(|| allow("OPTIONS, GET")))
        .route("/trace", post(trace))
        .route(
            "/data",
            put(put_data)
                .patch(patch_data)
                .options(|| allow("OPTIONS, GET, DELETE, PUT, PATCH")),
        )
        .route("/data/:key", get(get_data).delete(delete_data))
        .route(
            "/neighbors",
            put(put_neighbor).patch(patch_neighbor).delete(delete_neighbor),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn allow(methods: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Allow", HeaderValue::from_static(methods));
    (StatusCode::OK, headers).into_response()
}

// ---- /join --------------------------------------------------------------

async fn join(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: Result<ValidatedJson<wire::JoinRequest>, Response>,
) -> Response {
    let ValidatedJson(req) = match body {
        Ok(v) => v,
        Err(r) => return r,
    };

    let joiner = match req.host.as_deref().and_then(wire::parse_host) {
        Some(h) => h,
        None => host_from_remote(remote, remote.port()),
    };

    info!(%joiner, key = %req.key, "handling join");
    match state.node.handle_join(&req.key, joiner).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ---- /debug ---------------------------------------------------------------

async fn debug(State(state): State<ApiState>) -> Json<wire::DebugResponse> {
    Json(state.node.debug().await)
}

// ---- /trace ---------------------------------------------------------------

async fn trace(
    State(state): State<ApiState>,
    body: Result<ValidatedJson<wire::TraceRequest>, Response>,
) -> Response {
    let ValidatedJson(req) = match body {
        Ok(v) => v,
        Err(r) => return r,
    };

    match state.node.handle_trace(&req.key).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ---- /data ------------------------------------------------------------

async fn put_data(
    State(state): State<ApiState>,
    body: Result<ValidatedJson<wire::DataRequest>, Response>,
) -> Response {
    let ValidatedJson(req) = match body {
        Ok(v) => v,
        Err(r) => return r,
    };
    in_band(state.node.data_op(DataOp::Add, &req.key, Some(req.data)).await).into_response()
}

async fn patch_data(
    State(state): State<ApiState>,
    body: Result<ValidatedJson<wire::DataRequest>, Response>,
) -> Response {
    let ValidatedJson(req) = match body {
        Ok(v) => v,
        Err(r) => return r,
    };
    in_band(state.node.data_op(DataOp::Modify, &req.key, Some(req.data)).await).into_response()
}

async fn get_data(State(state): State<ApiState>, Path(key): Path<String>) -> Response {
    in_band(state.node.data_op(DataOp::Get, &key, None).await).into_response()
}

async fn delete_data(State(state): State<ApiState>, Path(key): Path<String>) -> Response {
    in_band(state.node.data_op(DataOp::Delete, &key, None).await).into_response()
}

// ---- /neighbors -------------------------------------------------------

async fn put_neighbor(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: Result<ValidatedJson<wire::NeighborRequest>, Response>,
) -> Response {
    let ValidatedJson(req) = match body {
        Ok(v) => v,
        Err(r) => return r,
    };
    let host = host_from_remote(remote, req.port);
    in_band(
        state
            .node
            .neighbor_add(host, req.range.into())
            .await
            .map(|_| wire::Empty::default()),
    )
    .into_response()
}

async fn patch_neighbor(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: Result<ValidatedJson<wire::NeighborRequest>, Response>,
) -> Response {
    let ValidatedJson(req) = match body {
        Ok(v) => v,
        Err(r) => return r,
    };
    let host = host_from_remote(remote, req.port);
    in_band(
        state
            .node
            .neighbor_patch(&host, req.range.into())
            .await
            .map(|_| wire::Empty::default()),
    )
    .into_response()
}

#[derive(Deserialize)]
pub struct DeleteNeighborQuery {
    pub port: u16,
}

async fn delete_neighbor(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(q): Query<DeleteNeighborQuery>,
) -> Response {
    let host = host_from_remote(remote, q.port);
    in_band(state.node.neighbor_remove(&host).await.map(|_| wire::Empty::default())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> ApiState {
        ApiState {
            node: Arc::new(CanNode::new(2, 1, Host::new("127.0.0.1", 3000))),
        }
    }

    fn app() -> Router {
        create_router(test_state())
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn solo_store_round_trip() {
        let app = app();

        let put_req = json_request("PUT", "/data", serde_json::json!({"key": "alpha", "data": "1"}));
        let resp = app.clone().oneshot(put_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Data successfully added");
        assert_eq!(value["data"], "1");

        let get_req = Request::builder().uri("/data/alpha").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(get_req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["data"], "1");

        let del_req = Request::builder()
            .method("DELETE")
            .uri("/data/alpha")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(del_req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["data"], "1");

        let get_req2 = Request::builder().uri("/data/alpha").body(Body::empty()).unwrap();
        let resp = app.oneshot(get_req2).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Key does not exist in map");
    }

    #[tokio::test]
    async fn duplicate_add_reports_exists() {
        let app = app();

        let put_req = json_request("PUT", "/data", serde_json::json!({"key": "alpha", "data": "1"}));
        let resp = app.clone().oneshot(put_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let put_req2 = json_request("PUT", "/data", serde_json::json!({"key": "alpha", "data": "2"}));
        let resp = app.oneshot(put_req2).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Key already exists in map");
    }

    #[tokio::test]
    async fn debug_reports_dimension_and_range() {
        let app = app();
        let req = Request::builder().uri("/debug").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["dimension"], 2);
        assert_eq!(value["redundancy"], 1);
    }

    #[tokio::test]
    async fn options_join_reports_allow_header() {
        let app = app();
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/join")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("Allow").unwrap(), "OPTIONS, POST");
    }

    #[tokio::test]
    async fn malformed_json_is_a_500() {
        let app = app();
        let req = Request::builder()
            .method("PUT")
            .uri("/data")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
