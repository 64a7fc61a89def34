use std::{
    collections::HashSet,
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One POST the mock received.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    pub fn message_type(&self) -> &str {
        self.body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Ingestion backend state: recorded requests, id sequence, and scripted failures.
#[derive(Clone, Default)]
pub struct MockIngest {
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    omit_ids: Arc<RwLock<HashSet<String>>>,
    next_id: Arc<AtomicU64>,
}

impl MockIngest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every message of `message_type` with HTTP 500.
    pub fn fail(&self, message_type: &str) {
        self.failing
            .write()
            .expect("mock ingest poisoned")
            .insert(message_type.to_owned());
    }

    pub fn recover(&self, message_type: &str) {
        self.failing
            .write()
            .expect("mock ingest poisoned")
            .remove(message_type);
    }

    /// Accepts `message_type` but answers without the issued id.
    pub fn omit_id(&self, message_type: &str) {
        self.omit_ids
            .write()
            .expect("mock ingest poisoned")
            .insert(message_type.to_owned());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().expect("mock ingest poisoned").clone()
    }

    pub fn types(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| request.message_type().to_owned())
            .collect()
    }

    pub fn count(&self, message_type: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.message_type() == message_type)
            .count()
    }

    pub fn of_type(&self, message_type: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|request| request.message_type() == message_type)
            .map(|request| request.body)
            .collect()
    }

    fn record(&self, request: RecordedRequest) {
        self.requests
            .write()
            .expect("mock ingest poisoned")
            .push(request);
    }

    fn is_failing(&self, message_type: &str) -> bool {
        self.failing
            .read()
            .expect("mock ingest poisoned")
            .contains(message_type)
    }

    fn omits_id(&self, message_type: &str) -> bool {
        self.omit_ids
            .read()
            .expect("mock ingest poisoned")
            .contains(message_type)
    }

    fn respond(&self, message_type: &str) -> Value {
        let field = match message_type {
            "run:start" => "run_id",
            "suite:start" => "suite_id",
            "case:start" => "case_id",
            _ => return json!({ "ok": true }),
        };
        if self.omits_id(message_type) {
            return json!({ "ok": true });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let prefix = field.trim_end_matches("_id");
        json!({ (field): format!("{prefix}-{id}") })
    }
}

pub struct MockIngestServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockIngestServer {
    pub async fn start(ingest: MockIngest) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock ingest listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let ingest = ingest.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(ingest.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock ingest server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}/ingest", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    ingest: MockIngest,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"));
    }

    let authorization = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(plain(
                StatusCode::BAD_REQUEST,
                format!("failed to read body: {err}"),
            ))
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(plain(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON payload: {err}"),
            ))
        }
    };

    let message_type = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    ingest.record(RecordedRequest {
        authorization,
        body: payload,
    });

    if ingest.is_failing(&message_type) {
        return Ok(plain(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{message_type} rejected"),
        ));
    }

    let mut response = Response::new(Body::from(ingest.respond(&message_type).to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}
