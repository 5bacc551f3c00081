//! TCP client for a counter server
//!
//! Holds at most one connection, opened lazily and re-opened after any
//! failure. Each call is a single request/response round trip bounded by the
//! client's timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tasbih_core::{Counter, CounterId, IncrementOutcome};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::CounterApi;
use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{Request, RequestFrame, Response, ResponseFrame};

/// Default bound on one round trip, connect included
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client handle for counter operations
pub struct Client {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
    next_request_id: AtomicU64,
}

impl Client {
    /// Create a client for `addr` (`host:port`). No connection is made until
    /// the first request.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            conn: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server address this client talks to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its response.
    ///
    /// Any failure drops the connection so the next call starts clean rather
    /// than reading a late answer to an abandoned request.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let frame = RequestFrame {
            request_id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            request,
        };
        let route = frame.request.route();

        let mut slot = self.conn.lock().await;
        let result = tokio::time::timeout(self.timeout, round_trip(&mut slot, &self.addr, &frame))
            .await
            .unwrap_or(Err(Error::Timeout(self.timeout)));

        match result {
            Ok(response) => {
                debug!(route = %route, status = response.status, "Request complete");
                Ok(response.body)
            }
            Err(e) => {
                warn!(route = %route, error = %e, "Request failed");
                *slot = None;
                Err(e)
            }
        }
    }

    async fn snapshot(&self, request: Request) -> Result<Counter> {
        match self.request(request).await? {
            Response::Snapshot { counter } => Ok(counter),
            Response::Error(e) => Err(Error::Api(e)),
            other => Err(unexpected(&other)),
        }
    }
}

async fn round_trip(
    slot: &mut Option<TcpStream>,
    addr: &str,
    frame: &RequestFrame,
) -> Result<ResponseFrame> {
    if slot.is_none() {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!(addr = %addr, "Connected to server");
        *slot = Some(stream);
    }
    let stream = slot.as_mut().ok_or(Error::ConnectionClosed)?;

    write_frame(stream, frame).await?;
    let response: ResponseFrame = read_frame(stream).await?;

    if response.request_id != frame.request_id {
        return Err(Error::Protocol(format!(
            "Response id {} does not match request {}",
            response.request_id, frame.request_id
        )));
    }
    Ok(response)
}

fn unexpected(response: &Response) -> Error {
    Error::Protocol(format!("Unexpected response: {:?}", response))
}

#[async_trait]
impl CounterApi for Client {
    async fn create(&self, goal: i64, created_by: &str) -> Result<Counter> {
        self.snapshot(Request::Create {
            goal,
            created_by: created_by.to_string(),
        })
        .await
    }

    async fn get_state(&self, id: CounterId) -> Result<Counter> {
        self.snapshot(Request::Get { id: id.to_string() }).await
    }

    async fn join(&self, id: CounterId, participant_name: &str) -> Result<Counter> {
        self.snapshot(Request::Join {
            id: id.to_string(),
            participant_name: participant_name.to_string(),
        })
        .await
    }

    async fn increment(&self, id: CounterId, participant_name: &str) -> Result<IncrementOutcome> {
        let response = self
            .request(Request::Increment {
                id: id.to_string(),
                participant_name: participant_name.to_string(),
            })
            .await?;

        match response {
            Response::Incremented {
                counter,
                transitioned_now,
            } => Ok(IncrementOutcome {
                counter,
                transitioned_now,
            }),
            Response::Error(e) => Err(Error::Api(e)),
            other => Err(unexpected(&other)),
        }
    }

    async fn reset(&self, id: CounterId, requesting_name: &str) -> Result<Counter> {
        self.snapshot(Request::Reset {
            id: id.to_string(),
            requesting_name: requesting_name.to_string(),
        })
        .await
    }
}
