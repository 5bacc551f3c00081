//! Tasbih Network Library
//!
//! Request/response transport between client sync agents and the counter
//! service.
//!
//! # Architecture
//!
//! - **Server**: fronts a [`CounterService`](tasbih_core::CounterService), one
//!   task per connection
//! - **Client**: lazily connected TCP client implementing [`CounterApi`]
//! - **Protocol**: length-prefixed JSON frames, each request answered by one
//!   response carrying an HTTP-style status code
//!
//! # Usage
//!
//! ```ignore
//! // Authority side
//! let service = Arc::new(CounterService::new(MemoryStore::new()));
//! let server = Server::start("0.0.0.0:7340".parse()?, service).await?;
//!
//! // Device side
//! let client = Client::new("192.168.1.10:7340");
//! let counter = client.create(33, "Amina").await?;
//! let outcome = client.increment(counter.id, "Amina").await?;
//! ```

pub mod api;
pub mod client;
pub mod error;
mod frame;
pub mod invite;
pub mod protocol;
pub mod server;

pub use api::{CounterApi, LocalApi};
pub use client::Client;
pub use error::{Error, Result};
pub use invite::JoinLink;
pub use protocol::{ApiError, ErrorKind, Request, Response};
pub use server::Server;

/// Default port for tasbih servers
pub const DEFAULT_PORT: u16 = 7340;
