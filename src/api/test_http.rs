//! Canned-response HTTP server for client tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// A request as seen by the server.
#[derive(Debug)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

type Canned = (StatusCode, String, Vec<u8>);

#[derive(Clone)]
struct FixtureState {
    responses: Arc<Mutex<VecDeque<Canned>>>,
    requests: mpsc::UnboundedSender<Recorded>,
}

pub struct TestHttp {
    pub base_url: String,
    requests: mpsc::UnboundedReceiver<Recorded>,
}

impl TestHttp {
    /// Answer requests with `responses` in order, whatever the route.
    pub async fn serve(responses: Vec<(u16, &str, Vec<u8>)>) -> Self {
        let (tx, requests) = mpsc::unbounded_channel();
        let responses = responses
            .into_iter()
            .map(|(status, ctype, body)| {
                (StatusCode::from_u16(status).unwrap(), ctype.to_string(), body)
            })
            .collect();

        let state = FixtureState {
            responses: Arc::new(Mutex::new(responses)),
            requests: tx,
        };
        let app = Router::new().fallback(canned).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://127.0.0.1:{}/api", port),
            requests,
        }
    }

    pub async fn json(status: u16, body: serde_json::Value) -> Self {
        Self::serve(vec![(status, "application/json", body.to_string().into_bytes())]).await
    }

    pub async fn next_request(&mut self) -> Recorded {
        timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("server stopped")
    }
}

async fn canned(
    State(state): State<FixtureState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let _ = state.requests.send(Recorded {
        method: method.to_string(),
        target: uri.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    });

    let next = state.responses.lock().unwrap().pop_front();
    match next {
        Some((status, content_type, body)) => {
            (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no canned response left").into_response(),
    }
}
