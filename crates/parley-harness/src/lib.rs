//! Deterministic simulation harness for Parley testing.
//!
//! Turmoil-based server and a seeded [`Environment`](parley_core::Environment)
//! for deterministic, reproducible end-to-end tests under various network
//! conditions.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_harness::{SimEnv, SimServer, client};
//!
//! let mut sim = turmoil::Builder::new().build();
//!
//! sim.host("server", || async {
//!     SimServer::new(RoomConfig::default(), SimEnv::with_seed(7)).serve(7890).await
//! });
//!
//! sim.client("client", async {
//!     let mut stream = turmoil::net::TcpStream::connect("server:7890").await?;
//!     let id = client::read_greeting(&mut stream).await?;
//!     Ok(())
//! });
//!
//! sim.run().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod sim_env;
pub mod sim_server;

pub use sim_env::SimEnv;
pub use sim_server::SimServer;
