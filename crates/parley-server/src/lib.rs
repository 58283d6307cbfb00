//! Parley production server.
//!
//! This crate provides the production runtime around `parley-core`:
//! - Tokio TCP listeners, one [`Room`] per listening endpoint
//! - System RNG for session ids
//! - Runtime configuration for the `parley-server` binary
//!
//! ## Architecture
//!
//! ```text
//! parley-server
//!   ├─ Server        (owns every endpoint for the process lifetime)
//!   │   └─ Endpoint  (TcpListener + Room)
//!   ├─ SystemEnv     (production Environment impl)
//!   └─ Session       (one task per accepted connection, from parley-core)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod system_env;

use std::{net::SocketAddr, sync::Arc};

pub use error::ServerError;
use parley_core::{Environment, Room, RoomConfig, Session, SessionConfig, SessionError};
pub use system_env::SystemEnv;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tracing::Instrument;

/// Address used when none is configured.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7890";

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Addresses to bind to (e.g., "0.0.0.0:7890"). Each gets its own room.
    pub bind_addresses: Vec<String>,
    /// Configuration shared by every endpoint's room
    pub room: RoomConfig,
    /// Configuration applied to every session
    pub session: SessionConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addresses: vec![DEFAULT_BIND_ADDRESS.to_string()],
            room: RoomConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// A bound listener and the room its sessions join.
struct Endpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
    room: Arc<Room>,
}

/// Production Parley server.
///
/// Owns every endpoint it bound; dropping the server (or the future returned
/// by [`Server::run`]) closes the listeners.
pub struct Server<E = SystemEnv> {
    endpoints: Vec<Endpoint>,
    session: SessionConfig,
    env: E,
}

impl Server<SystemEnv> {
    /// Bind every configured address using the system environment.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No address is configured
    /// - Binding to any address fails
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        Self::bind_with_env(config, SystemEnv::new()).await
    }
}

impl<E> Server<E>
where
    E: Environment,
{
    /// Bind every configured address, drawing session ids from `env`.
    pub async fn bind_with_env(config: ServerRuntimeConfig, env: E) -> Result<Self, ServerError> {
        if config.bind_addresses.is_empty() {
            return Err(ServerError::Config("at least one bind address is required".to_string()));
        }

        let mut endpoints = Vec::with_capacity(config.bind_addresses.len());
        for address in &config.bind_addresses {
            let listener = TcpListener::bind(address)
                .await
                .map_err(|source| ServerError::Bind { address: address.clone(), source })?;
            let local_addr = listener.local_addr()?;
            let room = Arc::new(Room::new(config.room.clone()));

            endpoints.push(Endpoint { listener, local_addr, room });
        }

        Ok(Self { endpoints, session: config.session, env })
    }

    /// Local addresses of all endpoints, in configuration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.endpoints.iter().map(|e| e.local_addr).collect()
    }

    /// Rooms of all endpoints, in configuration order.
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.endpoints.iter().map(|e| Arc::clone(&e.room)).collect()
    }

    /// Run the server, accepting connections on every endpoint.
    ///
    /// This method runs until every accept loop has stopped, which only
    /// happens if one panics.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut accept_loops = JoinSet::new();

        for endpoint in self.endpoints {
            let env = self.env.clone();
            let session = self.session.clone();
            let span = tracing::info_span!("endpoint", addr = %endpoint.local_addr);
            accept_loops.spawn(accept_loop(endpoint, env, session).instrument(span));
        }

        while let Some(result) = accept_loops.join_next().await {
            if let Err(e) = result {
                tracing::error!("Accept loop failed: {}", e);
            }
        }

        Ok(())
    }
}

impl<E> std::fmt::Debug for Server<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("endpoints", &self.endpoints.iter().map(|e| e.local_addr).collect::<Vec<_>>())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

async fn accept_loop<E: Environment>(endpoint: Endpoint, env: E, config: SessionConfig) {
    tracing::info!("Accepting connections");

    loop {
        match endpoint.listener.accept().await {
            Ok((stream, peer)) => dispatch(stream, peer, &endpoint.room, &env, &config),
            Err(e) => {
                tracing::error!("Accept error: {}", e);
            },
        }
    }
}

/// Bind an accepted stream to a new session and start it.
fn dispatch<E: Environment>(
    stream: TcpStream,
    peer: SocketAddr,
    room: &Arc<Room>,
    env: &E,
    config: &SessionConfig,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, "Failed to set TCP_NODELAY: {}", e);
    }

    let Some(id) = room.vacant_id(env) else {
        tracing::error!(%peer, "No free session id, dropping connection");
        return;
    };

    tracing::debug!(%peer, session_id = %id, "New connection");
    let session = Session::with_config(id.clone(), stream, Arc::clone(room), config.clone());

    tokio::spawn(async move {
        match session.run().await {
            Ok(()) => tracing::debug!(session_id = %id, %peer, "Connection closed"),
            Err(e) => log_session_error(&e, &id.to_string(), peer),
        }
    });
}

fn log_session_error(error: &SessionError, id: &str, peer: SocketAddr) {
    if error.is_protocol_violation() {
        tracing::warn!(session_id = id, %peer, "Protocol violation: {}", error);
    } else {
        tracing::debug!(session_id = id, %peer, "Connection error: {}", error);
    }
}
