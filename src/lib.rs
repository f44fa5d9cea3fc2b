//! amqp-bench library crate exposing modules for reuse and testing.

pub mod client;
pub mod config;
pub mod logging;
pub mod payload;
pub mod stats;
pub mod transport;
pub mod workload;

// Optional re-exports for convenience in downstream code/tests
pub use client::{Client, ClientState};
pub use config::Options;
pub use stats::{RunSnapshot, RunState};
pub use transport::{Engine, Link, Session, Transport, TransportBuilder, TransportError};
pub use workload::{ReceiverWorkload, SenderWorkload, Workload};
