//! TCP server fronting a counter service
//!
//! Clients open a connection and exchange request/response frames. Requests
//! on one connection are answered in order; separate connections run in
//! parallel and only meet inside the store's per-counter critical section.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tasbih_core::{CounterId, CounterService, CounterStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ApiError, Request, RequestFrame, Response, ResponseFrame};

/// Maximum number of simultaneous client connections
const MAX_CONNECTIONS: usize = 1024;

/// Counter server handle
pub struct Server {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start serving `service`. Port 0 picks a free port.
    pub async fn start<S>(bind: SocketAddr, service: Arc<CounterService<S>>) -> Result<Self>
    where
        S: CounterStore + 'static,
    {
        let listener = TcpListener::bind(bind).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let connections = Arc::new(AtomicUsize::new(0));

        tokio::spawn(accept_loop(
            listener,
            service,
            connections.clone(),
            shutdown_tx.clone(),
        ));

        Ok(Server {
            addr: bound_addr,
            connections,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of open client connections
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Stop accepting and close every connection
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Accept incoming connections
async fn accept_loop<S>(
    listener: TcpListener,
    service: Arc<CounterService<S>>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
) where
    S: CounterStore + 'static,
{
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if connections.load(Ordering::Relaxed) >= MAX_CONNECTIONS {
                            warn!(addr = %addr, "Connection limit reached, dropping client");
                            continue;
                        }
                        debug!(addr = %addr, "New connection");
                        connections.fetch_add(1, Ordering::Relaxed);
                        let service = service.clone();
                        let connections = connections.clone();
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            handle_connection(stream, addr, service, shutdown_rx).await;
                            connections.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Serve requests on one connection until it closes
async fn handle_connection<S: CounterStore>(
    mut stream: TcpStream,
    addr: SocketAddr,
    service: Arc<CounterService<S>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let frame: RequestFrame = tokio::select! {
            result = read_frame::<_, RequestFrame>(&mut stream) => match result {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed) => {
                    debug!(addr = %addr, "Connection closed");
                    break;
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Read error");
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        };

        let route = frame.request.route();
        let body = dispatch(&service, frame.request);
        let response = ResponseFrame::new(frame.request_id, body);
        debug!(addr = %addr, route = %route, status = response.status, "Handled request");

        if let Err(e) = write_frame(&mut stream, &response).await {
            debug!(addr = %addr, error = %e, "Write failed");
            break;
        }
    }
}

/// Run a request on the current task, stepping out of the reactor first
/// when the store blocks on disk I/O
fn dispatch<S: CounterStore>(service: &CounterService<S>, request: Request) -> Response {
    let multi_thread = Handle::current().runtime_flavor() == RuntimeFlavor::MultiThread;
    if service.is_blocking() && multi_thread {
        tokio::task::block_in_place(|| handle_request(service, request))
    } else {
        handle_request(service, request)
    }
}

/// Dispatch one request to the service and shape the response.
///
/// The service call is synchronous and touches only the store, so no await
/// point sits inside a counter's critical section.
pub fn handle_request<S: CounterStore>(service: &CounterService<S>, request: Request) -> Response {
    let result = match request {
        Request::Create { goal, created_by } => service
            .create_counter(goal, &created_by)
            .map(|counter| Response::Snapshot { counter }),
        Request::Get { id } => CounterId::parse(&id)
            .and_then(|id| service.get_state(id))
            .map(|counter| Response::Snapshot { counter }),
        Request::Join {
            id,
            participant_name,
        } => CounterId::parse(&id)
            .and_then(|id| service.join_counter(id, &participant_name))
            .map(|counter| Response::Snapshot { counter }),
        Request::Increment {
            id,
            participant_name,
        } => CounterId::parse(&id)
            .and_then(|id| service.increment(id, &participant_name))
            .map(Response::from),
        Request::Reset {
            id,
            requesting_name,
        } => CounterId::parse(&id)
            .and_then(|id| service.reset(id, &requesting_name))
            .map(|counter| Response::Snapshot { counter }),
    };

    result.unwrap_or_else(|e| {
        match &e {
            tasbih_core::Error::AlreadyCompleted(_) => debug!(error = %e, "Increment after completion"),
            e if e.is_not_found() => debug!(error = %e, "Unknown counter"),
            tasbih_core::Error::Database(_)
            | tasbih_core::Error::Io(_)
            | tasbih_core::Error::Serialization(_) => error!(error = %e, "Request failed"),
            _ => warn!(error = %e, "Request rejected"),
        }
        Response::Error(ApiError::from(&e))
    })
}
