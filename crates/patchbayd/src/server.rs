//! HTTP front end for the command API.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Result, anyhow};
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use patchbay_engine::ApiEngine;
use patchbay_types::Body;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::form_urlencoded;

/// Mount point for the versioned command endpoint.
const API_PATH: &str = "/api/v2";

/// Host configuration for the API's HTTP listener.
pub struct ApiServer {
    bind_address: SocketAddr,
    engine: Arc<ApiEngine>,
}

impl ApiServer {
    pub fn new(bind_address: SocketAddr, engine: Arc<ApiEngine>) -> Self {
        Self {
            bind_address,
            engine,
        }
    }

    /// Start the listener and return a handle for runtime inspection and
    /// shutdown.
    pub async fn start(self) -> Result<RunningApiServer> {
        let cancellation_token = CancellationToken::new();
        let router = Router::new()
            .route(API_PATH, get(handle_api).post(handle_api))
            .with_state(self.engine);
        let listener = tokio::net::TcpListener::bind(self.bind_address).await?;
        let bound_address = listener.local_addr()?;

        let server_handle = tokio::spawn({
            let shutdown = cancellation_token.child_token();
            async move {
                let _ = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await;
            }
        });
        info!(address = %bound_address, "api server listening");

        Ok(RunningApiServer {
            bind_address: bound_address,
            cancellation_token,
            server_handle,
        })
    }
}

/// Runtime handle for a running API server.
pub struct RunningApiServer {
    bind_address: SocketAddr,
    cancellation_token: CancellationToken,
    server_handle: JoinHandle<()>,
}

impl RunningApiServer {
    /// Return the bound socket address for the running server.
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Stop the listener and wait for in-flight requests to drain.
    pub async fn stop(self) -> Result<()> {
        self.cancellation_token.cancel();
        self.server_handle
            .await
            .map_err(|error| anyhow!("api server task failed: {error}"))?;
        Ok(())
    }
}

async fn handle_api(
    State(engine): State<Arc<ApiEngine>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = request_params(&uri, &headers, &body);
    match tokio::task::spawn_blocking(move || engine.handle(params)).await {
        Ok(Ok(rendered)) => {
            let headers = [(header::CONTENT_TYPE, rendered.content_type)];
            match rendered.body {
                Body::Text(text) => (headers, text).into_response(),
                Body::Bytes(bytes) => (headers, bytes).into_response(),
            }
        }
        // The engine reports faults this way only under debug=1; hand the
        // caller the whole chain.
        Ok(Err(fault)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{fault:?}")).into_response()
        }
        Err(join_fault) => {
            error!(error = %join_fault, "api request task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "request task failed").into_response()
        }
    }
}

/// Merge query-string and form-body pairs into one parameter map. The body
/// contributes only when the request declares a urlencoded form, and its
/// values win when a name appears in both places. A request without a form
/// body (a bodyless POST, a JSON body) is served from the query string
/// alone.
fn request_params(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Map<String, Value> {
    let mut params = Map::new();
    collect_pairs(uri.query().unwrap_or("").as_bytes(), &mut params);
    if is_form_request(headers) {
        collect_pairs(body, &mut params);
    }
    params
}

fn is_form_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

fn collect_pairs(raw: &[u8], params: &mut Map<String, Value>) {
    for (name, value) in form_urlencoded::parse(raw) {
        params.insert(name.into_owned(), Value::String(value.into_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn form_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        headers
    }

    #[test]
    fn body_pairs_override_query_pairs() {
        let uri: Uri = "/api/v2?cmd=status&out_type=xml".parse().unwrap();

        let params = request_params(&uri, &form_headers(), b"out_type=json&debug=1");

        assert_eq!(params.get("cmd"), Some(&Value::String("status".into())));
        assert_eq!(params.get("out_type"), Some(&Value::String("json".into())));
        assert_eq!(params.get("debug"), Some(&Value::String("1".into())));
    }

    #[test]
    fn percent_encoding_is_decoded() {
        let uri: Uri = "/api/v2?cmd=get_logs&search=hello%20world".parse().unwrap();

        let params = request_params(&uri, &HeaderMap::new(), b"");

        assert_eq!(
            params.get("search"),
            Some(&Value::String("hello world".into()))
        );
    }

    #[test]
    fn a_bodyless_request_keeps_its_query_parameters() {
        let uri: Uri = "/api/v2?cmd=docs".parse().unwrap();
        let params = request_params(&uri, &HeaderMap::new(), b"");
        assert_eq!(params.get("cmd"), Some(&Value::String("docs".into())));
    }

    #[test]
    fn non_form_bodies_are_ignored() {
        let uri: Uri = "/api/v2?cmd=docs".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let params = request_params(&uri, &headers, br#"{"cmd":"restart"}"#);

        assert_eq!(params.get("cmd"), Some(&Value::String("docs".into())));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn a_bare_uri_yields_no_parameters() {
        let uri: Uri = "/api/v2".parse().unwrap();
        assert!(request_params(&uri, &HeaderMap::new(), b"").is_empty());
    }
}
