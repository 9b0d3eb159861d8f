//! Hyper-based HTTP Server
//!
//! Direct Hyper implementation with manual routing, no framework layer.

use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpSocket;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::models::{EmbeddingError, WordVectorsManager};
use crate::protocol::http::{
    AvailableTokenizersResponse, EmbeddingRequest, EmbeddingResponse, EmbeddingsRequest,
    EmbeddingsResponse, HealthResponse, HttpErrorResponse, RootResponse, SimilarWordsResponse,
    TokenizeRequest, TokenizeResponse,
};
use crate::server::config::ServerConfig;

const SIMILAR_PREFIX: &str = "/similar/";

/// Shared state for Hyper server
#[derive(Clone)]
pub struct ServerState {
    manager: Arc<WordVectorsManager>,
    config: Arc<ServerConfig>,
}

impl ServerState {
    pub fn new(manager: Arc<WordVectorsManager>, config: Arc<ServerConfig>) -> Self {
        Self { manager, config }
    }
}

/// Start the Hyper HTTP server and serve until `shutdown` resolves
pub async fn start_hyper_http_server<F>(
    config: Arc<ServerConfig>,
    manager: Arc<WordVectorsManager>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()>,
{
    let bind_address = config.network.bind_address.clone();

    info!("🚀 Starting Hyper HTTP Server");
    info!("📡 Binding to {}", bind_address);

    let state = ServerState::new(manager, Arc::clone(&config));

    // Create service factory
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                handle_request(req, state)
            }))
        }
    });

    let addr: SocketAddr = bind_address.parse()?;
    let socket = if addr.is_ipv6() {
        TcpSocket::new_v6()?
    } else {
        TcpSocket::new_v4()?
    };

    // Nagle buffers small packets causing 40-200ms delays
    socket.set_nodelay(true)?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(config.network.listen_backlog)?;

    let server = Server::from_tcp(listener.into_std()?)?
        .http1_keepalive(true)
        .http1_half_close(false)
        .tcp_nodelay(true)
        .tcp_sleep_on_accept_errors(true)
        .serve(make_svc)
        .with_graceful_shutdown(shutdown);

    info!("✅ Hyper HTTP server listening on {}", bind_address);
    info!("📍 Endpoints:");
    info!("   GET  /                      - Service info");
    info!("   GET  /health                - Health check");
    info!("   POST /embedding             - Vector for one word");
    info!("   POST /embeddings            - Vectors for many words");
    info!("   GET  /similar/{{word}}?n=     - Nearest neighbours");
    info!("   POST /tokenize              - Tokenize text");
    info!("   GET  /available-tokenizers  - Tokenizer models");

    server.await?;

    info!("🛑 HTTP server stopped");
    Ok(())
}

/// Main request handler
pub async fn handle_request(
    req: Request<Body>,
    state: ServerState,
) -> Result<Response<Body>, Infallible> {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = info_span!("request", %request_id, %method, %path);

    async move {
        let start_time = Instant::now();

        let origin = req
            .headers()
            .get("origin")
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("*"));
        let query = req.uri().query().map(str::to_string);

        let mut response = match (&method, path.as_str()) {
            (&Method::GET, "/") => handle_root(&state),
            (&Method::GET, "/health") => handle_health(&state),
            (&Method::POST, "/embedding") => handle_embedding(req, &state).await,
            (&Method::POST, "/embeddings") => handle_embeddings(req, &state).await,
            (&Method::GET, p) if p.starts_with(SIMILAR_PREFIX) => {
                handle_similar(&p[SIMILAR_PREFIX.len()..], query.as_deref(), &state)
            }
            (&Method::POST, "/tokenize") => handle_tokenize(req, &state).await,
            (&Method::GET, "/available-tokenizers") => handle_available_tokenizers(&state),
            (&Method::OPTIONS, _) => handle_options(),
            _ => error_response(StatusCode::NOT_FOUND, HttpErrorResponse::route_not_found()),
        };

        let headers = response.headers_mut();
        headers.insert("access-control-allow-origin", origin);
        headers.insert(
            "access-control-allow-methods",
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            "access-control-allow-headers",
            HeaderValue::from_static("content-type"),
        );
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            headers.insert("x-request-id", value);
        }

        if state.config.monitoring.enable_detailed_logging {
            info!("{} in {:?}", response.status(), start_time.elapsed());
        } else {
            debug!("{} in {:?}", response.status(), start_time.elapsed());
        }

        Ok(response)
    }
    .instrument(span)
    .await
}

/// OPTIONS handler for CORS preflight
fn handle_options() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// Root endpoint - service info
fn handle_root(state: &ServerState) -> Response<Body> {
    json_response(StatusCode::OK, &RootResponse::from(state.manager.model_info()))
}

/// Health check endpoint
fn handle_health(state: &ServerState) -> Response<Body> {
    debug!("🏥 Health check requested");
    json_response(StatusCode::OK, &HealthResponse::from_state(state.manager.load_state()))
}

async fn handle_embedding(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let request: EmbeddingRequest = match read_json(req, state).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.manager.get_embedding(&request.word) {
        Ok(Some(embedding)) => json_response(StatusCode::OK, &EmbeddingResponse { embedding }),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            HttpErrorResponse::word_not_found(&request.word),
        ),
        Err(e) => embedding_error_response(e),
    }
}

async fn handle_embeddings(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let request: EmbeddingsRequest = match read_json(req, state).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    if let Err(msg) = request.validate(state.config.limits.max_batch_size) {
        return error_response(StatusCode::BAD_REQUEST, HttpErrorResponse::invalid_input(msg));
    }

    match state.manager.get_embeddings(&request.words) {
        Ok(results) => json_response(StatusCode::OK, &EmbeddingsResponse { results }),
        Err(e) => embedding_error_response(e),
    }
}

fn handle_similar(raw_word: &str, query: Option<&str>, state: &ServerState) -> Response<Body> {
    if raw_word.is_empty() || raw_word.contains('/') {
        return error_response(StatusCode::NOT_FOUND, HttpErrorResponse::route_not_found());
    }

    let word = decode_path_segment(raw_word);
    let n = query.and_then(parse_top_n);

    match state.manager.get_similar(&word, n) {
        Ok(Some(similar_words)) => {
            json_response(StatusCode::OK, &SimilarWordsResponse { similar_words })
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, HttpErrorResponse::word_not_found(&word)),
        Err(e) => embedding_error_response(e),
    }
}

async fn handle_tokenize(req: Request<Body>, state: &ServerState) -> Response<Body> {
    let request: TokenizeRequest = match read_json(req, state).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    if let Err(msg) = request.validate(state.config.limits.max_text_length) {
        return error_response(StatusCode::BAD_REQUEST, HttpErrorResponse::invalid_input(msg));
    }

    match state.manager.tokenize(&request.text, request.model.as_deref()) {
        Ok(tokenized) => {
            debug!("🔤 {} tokens via {}", tokenized.token_count(), tokenized.encoding);
            json_response(StatusCode::OK, &TokenizeResponse::from(tokenized))
        }
        Err(e) => embedding_error_response(e),
    }
}

fn handle_available_tokenizers(state: &ServerState) -> Response<Body> {
    let (available_models, default_encoding) = state.manager.available_tokenizers();
    json_response(
        StatusCode::OK,
        &AvailableTokenizersResponse {
            available_models,
            default_encoding,
        },
    )
}

/// Read and parse a JSON request body, or produce the error response
async fn read_json<T: DeserializeOwned>(
    req: Request<Body>,
    state: &ServerState,
) -> Result<T, Response<Body>> {
    let limit = state.config.network.max_body_bytes;
    let too_large = || error_response(StatusCode::PAYLOAD_TOO_LARGE, HttpErrorResponse::payload_too_large(limit));

    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map_or(false, |len| len > limit) {
        return Err(too_large());
    }

    // Chunked bodies carry no Content-Length, so the limit is enforced per frame.
    let mut body = req.into_body();
    let mut body_bytes = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|_| {
            error_response(
                StatusCode::BAD_REQUEST,
                HttpErrorResponse::invalid_input("Failed to read request body"),
            )
        })?;
        if body_bytes.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body_bytes.extend_from_slice(&chunk);
    }

    serde_json::from_slice(&body_bytes).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            HttpErrorResponse::invalid_input(format!("Invalid request body: {}", e)),
        )
    })
}

/// Map façade errors to status codes; unexpected details only go to the log
fn embedding_error_response(error: EmbeddingError) -> Response<Body> {
    match error {
        EmbeddingError::NotReady => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, HttpErrorResponse::model_not_ready())
        }
        EmbeddingError::InvalidInput { message } => {
            error_response(StatusCode::BAD_REQUEST, HttpErrorResponse::invalid_input(message))
        }
        other => {
            error!("❌ Request failed: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, HttpErrorResponse::internal_error())
        }
    }
}

/// Percent-decode a single path segment (`+` stays a literal plus)
fn decode_path_segment(segment: &str) -> String {
    let escaped = segment
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn parse_top_n(query: &str) -> Option<i64> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "n")
        .and_then(|(_, value)| value.trim().parse::<i64>().ok())
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("❌ Response serialization failed: {}", e);
            let mut response = Response::new(Body::from(r#"{"error":"Internal server error"}"#));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
    }
}

/// Helper to create error responses
fn error_response(status: StatusCode, error: HttpErrorResponse) -> Response<Body> {
    json_response(status, &error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manager::tests::{loading_manager, ready_manager};
    use hyper::body::{to_bytes, Bytes};
    use serde_json::Value;

    fn state(manager: WordVectorsManager) -> ServerState {
        let mut config = ServerConfig::default();
        config.limits.max_batch_size = 3;
        config.limits.max_text_length = 64;
        config.network.max_body_bytes = 1024;
        ServerState::new(Arc::new(manager), Arc::new(config))
    }

    async fn send(state: &ServerState, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let req = Request::builder().method(method).uri(uri).body(body).unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();

        assert!(response.headers().contains_key("x-request-id"));
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let ready = state(ready_manager());
        let (status, body) = send(&ready, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "GloVe Word Embeddings API");
        assert_eq!(body["model"], "glove-wiki-gigaword-300");
        assert_eq!(body["dimensions"], 3);
        assert_eq!(body["status"], "running");

        let (status, body) = send(&ready, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], true);

        let loading = state(loading_manager());
        let (_, body) = send(&loading, Method::GET, "/health", None).await;
        assert_eq!(body["model_loaded"], false);
        let (_, body) = send(&loading, Method::GET, "/", None).await;
        assert_eq!(body["status"], "initializing");
    }

    #[tokio::test]
    async fn test_embedding_endpoint() {
        let ready = state(ready_manager());

        let (status, body) = send(&ready, Method::POST, "/embedding", Some(r#"{"word":"computer"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["embedding"].as_array().unwrap().len(), 3);

        let (status, body) = send(&ready, Method::POST, "/embedding", Some(r#"{"word":"xyzzy123"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "WORD_NOT_FOUND");

        let (status, _) = send(&ready, Method::POST, "/embedding", Some(r#"{"text":"computer"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&ready, Method::POST, "/embedding", Some("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let loading = state(loading_manager());
        let (status, body) = send(&loading, Method::POST, "/embedding", Some(r#"{"word":"computer"}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "MODEL_NOT_READY");
    }

    #[tokio::test]
    async fn test_embeddings_endpoint() {
        let ready = state(ready_manager());

        let (status, body) = send(
            &ready,
            Method::POST,
            "/embeddings",
            Some(r#"{"words":["laptop","xyzzy123"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"]["laptop"]["embedding"].as_array().unwrap().len(), 3);
        assert!(body["results"]["xyzzy123"]["embedding"].is_null());

        let (status, _) = send(
            &ready,
            Method::POST,
            "/embeddings",
            Some(r#"{"words":["a","b","c","d"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let loading = state(loading_manager());
        let (status, _) = send(&loading, Method::POST, "/embeddings", Some(r#"{"words":["laptop"]}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_similar_endpoint() {
        let ready = state(ready_manager());

        let (status, body) = send(&ready, Method::GET, "/similar/computer", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["similar_words"].as_array().unwrap().len(), 10);

        let (_, body) = send(&ready, Method::GET, "/similar/computer?n=2", None).await;
        let words: Vec<&str> = body["similar_words"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["word"].as_str().unwrap())
            .collect();
        assert_eq!(words, vec!["laptop", "desktop"]);

        let (_, body) = send(&ready, Method::GET, "/similar/computer?n=abc", None).await;
        assert_eq!(body["similar_words"].as_array().unwrap().len(), 10);

        let (status, _) = send(&ready, Method::GET, "/similar/Comp%75ter?n=1", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&ready, Method::GET, "/similar/xyzzy123", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "WORD_NOT_FOUND");

        let (status, body) = send(&ready, Method::GET, "/similar/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let loading = state(loading_manager());
        let (status, _) = send(&loading, Method::GET, "/similar/computer", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_tokenize_endpoints() {
        let loading = state(loading_manager());

        let (status, body) = send(
            &loading,
            Method::POST,
            "/tokenize",
            Some(r#"{"text":"hello world","model":"gpt-4"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_count"], 2);
        assert_eq!(body["tokens"].as_array().unwrap().len(), 2);
        assert_eq!(body["token_strings"][0], "HELLO");

        let long_text = format!(r#"{{"text":"{}"}}"#, "x".repeat(100));
        let (status, _) = send(&loading, Method::POST, "/tokenize", Some(&long_text)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&loading, Method::GET, "/available-tokenizers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available_models"][0], "gpt-4");
        assert_eq!(body["default_encoding"], "upper_base");
    }

    #[tokio::test]
    async fn test_routing_and_limits() {
        let ready = state(ready_manager());

        let (status, body) = send(&ready, Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, body) = send(&ready, Method::OPTIONS, "/embedding", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let huge = format!(r#"{{"word":"{}"}}"#, "x".repeat(2048));
        let (status, body) = send(&ready, Method::POST, "/embedding", Some(&huge)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_rejected() {
        let ready = state(ready_manager());
        let (mut sender, body) = Body::channel();

        tokio::spawn(async move {
            let _ = sender.send_data(Bytes::from_static(b"{\"word\":\"")).await;
            for _ in 0..64 {
                if sender.send_data(Bytes::from(vec![b'x'; 64])).await.is_err() {
                    return;
                }
            }
            let _ = sender.send_data(Bytes::from_static(b"\"}")).await;
        });

        let req = Request::builder()
            .method(Method::POST)
            .uri("/embedding")
            .body(body)
            .unwrap();
        assert!(req.headers().get(CONTENT_LENGTH).is_none());

        let response = handle_request(req, ready.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_chunked_body_within_limit_is_accepted() {
        let ready = state(ready_manager());
        let (mut sender, body) = Body::channel();

        tokio::spawn(async move {
            for part in [&b"{\"word\":"[..], &b"\"laptop\"}"[..]] {
                if sender.send_data(Bytes::copy_from_slice(part)).await.is_err() {
                    return;
                }
            }
        });

        let req = Request::builder()
            .method(Method::POST)
            .uri("/embedding")
            .body(body)
            .unwrap();
        let response = handle_request(req, ready.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["embedding"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_decode_path_segment() {
        assert_eq!(decode_path_segment("caf%C3%A9"), "café");
        assert_eq!(decode_path_segment("c%2B%2B"), "c++");
        assert_eq!(decode_path_segment("a+b"), "a+b");
        assert_eq!(decode_path_segment("rock&roll"), "rock&roll");
        assert_eq!(decode_path_segment("x=y"), "x=y");
    }

    #[test]
    fn test_parse_top_n() {
        assert_eq!(parse_top_n("n=5"), Some(5));
        assert_eq!(parse_top_n("foo=1&n=-2"), Some(-2));
        assert_eq!(parse_top_n("n=abc"), None);
        assert_eq!(parse_top_n(""), None);
    }

    #[test]
    fn test_error_responses() {
        let response = embedding_error_response(EmbeddingError::NotReady);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = embedding_error_response(EmbeddingError::ModelLoadFailed {
            error: "secret path".to_string(),
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
