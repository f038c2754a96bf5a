//! # rinkcast-server
//!
//! The broadcast side of the pipeline: an Axum HTTP + WebSocket server that
//! fans ordered pipeline outputs out to subscribers.
//!
//! - [`protocol`]: the push wire protocol (narration, audio, batch end,
//!   skip, end frames)
//! - [`connection`]: per-subscriber state with a bounded outbound queue
//! - [`heartbeat`]: ping/pong liveness; silent subscribers are closed
//! - [`hub`]: fan-out of [`OutputEvent`]s; slow subscribers are
//!   disconnected, the pipeline never stalls
//! - [`session`]: WebSocket session lifecycle per subscriber
//! - [`server`]: router, health, metrics, graceful listen
//! - [`shutdown`]: cancellation-token based shutdown coordination
//!
//! [`OutputEvent`]: rinkcast_pipeline::OutputEvent

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod health;
pub mod heartbeat;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use hub::BroadcastHub;
pub use server::RinkcastServer;
pub use shutdown::ShutdownCoordinator;
