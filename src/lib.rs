#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod monitor;
pub mod scheduler;
pub mod server;
pub mod sinks;
pub mod store;
pub mod telemetry;

pub type Result<T> = std::result::Result<T, error::Error>;
