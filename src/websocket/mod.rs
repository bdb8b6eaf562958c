//! WebSocket module for channel connection management

mod backoff;
mod client;
mod session;
mod transport;

pub use backoff::{Backoff, BackoffConfig};
pub use client::WsTransport;
pub use session::{Session, SessionContext, SessionSettings, SessionState};
pub use transport::{FrameSink, Transport, TransportConnection, TransportEvent};
