//! # clashlink
//!
//! Client-side protocol layer for a two-player match server.
//!
//! One long-lived TCP connection carries small binary messages. This
//! crate frames and decodes them, queues them, and dispatches them
//! against a session state machine (handshake → lobby → match → ended).
//! Game code never touches the socket: it reads [`GameEvent`]s and
//! calls the outbound methods on [`Client`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//!
//! use clashlink::prelude::*;
//!
//! # async fn demo() -> Result<(), ClientError> {
//! let mut client = Client::builder()
//!     .server("127.0.0.1:7777")
//!     .nick("Zed")
//!     .build::<TcpConnection>();
//! client.open().await?;
//!
//! client
//!     .run_at(30, |client, _report| {
//!         for event in client.take_events() {
//!             println!("{event:?}");
//!         }
//!         ControlFlow::Continue(())
//!     })
//!     .await
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::{CancelHandle, Client, ClientBuilder, PumpReport};
pub use config::ClientConfig;
pub use error::ClientError;

pub use clashlink_protocol as protocol;
pub use clashlink_session as session;
pub use clashlink_transport as transport;

pub use clashlink_session::GameEvent;

/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`
/// (default `info`).
///
/// Meant for binaries. Libraries embedding the client install their own
/// subscriber, or none.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

pub mod prelude {
    pub use crate::{
        CancelHandle, Client, ClientBuilder, ClientConfig, ClientError, PumpReport,
    };
    pub use clashlink_protocol::{
        EntityId, Framing, MessageType, ProtocolVersion, UserId,
    };
    pub use clashlink_session::{GameEvent, Phase, PlayerRole, QueuePolicy};
    pub use clashlink_transport::{Connection, TcpConnection};
}
