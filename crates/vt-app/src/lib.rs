//! HTTP services for both pipeline stages and the bridge that chains them.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
