//! A scriptable HTTP server standing in for an upstream vendor.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use url::Url;

/// One scripted answer of the mock.
#[derive(Clone)]
pub enum Reply {
    /// A JSON body with the given status.
    Json { status: StatusCode, body: Value },
    /// A complete server-sent event stream. Each entry is `(event name, data)`.
    Sse(Vec<(Option<String>, String)>),
    /// Server-sent events followed by a connection that never completes.
    SseThenHang(Vec<(Option<String>, String)>),
    /// Never answers.
    Hang,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self::Json {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn error(status: u16, body: Value) -> Self {
        Self::Json {
            status: StatusCode::from_u16(status).unwrap(),
            body,
        }
    }

    /// Unnamed `data:` events.
    pub fn sse<I, S>(data: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Sse(data.into_iter().map(|data| (None, data.into())).collect())
    }

    /// Named events, as Anthropic sends them.
    pub fn events<I, E, S>(events: I) -> Self
    where
        I: IntoIterator<Item = (E, S)>,
        E: Into<String>,
        S: Into<String>,
    {
        Self::Sse(
            events
                .into_iter()
                .map(|(event, data)| (Some(event.into()), data.into()))
                .collect(),
        )
    }

    /// Turn a complete stream into one that stays open after its last event.
    pub fn then_hang(self) -> Self {
        match self {
            Self::Sse(events) => Self::SseThenHang(events),
            other => other,
        }
    }
}

/// A request the mock received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Builder for a mock vendor. Replies of a route are served in order and the last one
/// repeats.
#[derive(Default)]
pub struct MockVendor {
    routes: HashMap<(Method, String), Vec<Reply>>,
}

impl MockVendor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(mut self, path: &str, reply: Reply) -> Self {
        self.routes.entry((Method::POST, path.to_string())).or_default().push(reply);
        self
    }

    pub fn get(mut self, path: &str, reply: Reply) -> Self {
        self.routes.entry((Method::GET, path.to_string())).or_default().push(reply);
        self
    }

    pub async fn start(self) -> anyhow::Result<TestVendor> {
        let routes = self
            .routes
            .into_iter()
            .map(|(route, replies)| (route, VecDeque::from(replies)))
            .collect();

        let state = Arc::new(VendorState {
            routes: Mutex::new(routes),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                log::error!("mock vendor stopped: {error}");
            }
        });

        Ok(TestVendor { address, state })
    }
}

struct VendorState {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A running mock vendor.
pub struct TestVendor {
    address: SocketAddr,
    state: Arc<VendorState>,
}

impl TestVendor {
    /// The URL of a path on the mock, usable as a provider base URL.
    pub fn url(&self, path: &str) -> Url {
        format!("http://{}{path}", self.address).parse().unwrap()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("the mock received no request")
    }

    /// Number of requests received on a path.
    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|request| request.path == path).count()
    }
}

async fn handle(
    State(state): State<Arc<VendorState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();

    let recorded = RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_string()))
            .collect(),
        body: serde_json::from_slice(&body).ok(),
    };

    state.requests.lock().unwrap().push(recorded);

    let reply = {
        let mut routes = state.routes.lock().unwrap();

        routes.get_mut(&(method, path)).and_then(|replies| {
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        })
    };

    match reply {
        Some(reply) => respond(reply).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn respond(reply: Reply) -> Response {
    match reply {
        Reply::Json { status, body } => (status, axum::Json(body)).into_response(),
        Reply::Sse(events) => ([(CONTENT_TYPE, "text/event-stream")], encode(&events)).into_response(),
        Reply::SseThenHang(events) => {
            let chunks = events
                .iter()
                .map(|event| Ok::<_, Infallible>(encode(std::slice::from_ref(event))))
                .collect::<Vec<_>>();

            let body = futures::stream::iter(chunks).chain(futures::stream::pending());

            ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
        }
        Reply::Hang => futures::future::pending().await,
    }
}

fn encode(events: &[(Option<String>, String)]) -> String {
    events
        .iter()
        .map(|(event, data)| match event {
            Some(event) => format!("event: {event}\ndata: {data}\n\n"),
            None => format!("data: {data}\n\n"),
        })
        .collect()
}
