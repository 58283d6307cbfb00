//! Turmoil-hosted server.
//!
//! Mirrors the production dispatcher: every accepted stream gets a fresh id
//! and a [`Session`] joined to the one shared room.

use std::sync::Arc;

use parley_core::{Environment, Room, RoomConfig, Session, SessionConfig};
use turmoil::net::TcpListener;

use crate::SimEnv;

/// Single-room server for simulations.
#[derive(Debug, Clone)]
pub struct SimServer<E = SimEnv> {
    room: Arc<Room>,
    env: E,
    session: SessionConfig,
}

impl<E> SimServer<E>
where
    E: Environment,
{
    /// Create a server with a fresh room.
    pub fn new(config: RoomConfig, env: E) -> Self {
        Self::with_room(Arc::new(Room::new(config)), env, SessionConfig::default())
    }

    /// Create a server around an existing room, so tests can inspect it.
    pub fn with_room(room: Arc<Room>, env: E, session: SessionConfig) -> Self {
        Self { room, env, session }
    }

    /// The room every session joins.
    pub fn room(&self) -> Arc<Room> {
        Arc::clone(&self.room)
    }

    /// Accept connections on `port` forever.
    pub async fn serve(self, port: u16) -> turmoil::Result {
        let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;

        loop {
            let (stream, peer) = listener.accept().await?;
            let Some(id) = self.room.vacant_id(&self.env) else {
                tracing::error!(%peer, "No free session id, dropping connection");
                continue;
            };

            let session =
                Session::with_config(id, stream, Arc::clone(&self.room), self.session.clone());
            tokio::spawn(async move {
                if let Err(e) = session.run().await {
                    tracing::debug!(%peer, "Session ended: {}", e);
                }
            });
        }
    }
}
