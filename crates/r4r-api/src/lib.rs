//! Render API client for r4r
//!
//! This crate provides the REST client for services, deploys, jobs and log
//! history, plus the WebSocket connector used for live log subscriptions.

mod client;
mod convert;
mod error;
mod logs;
mod reconnect;
mod socket;

pub use client::{DEFAULT_BASE_URL, RenderClient};
pub use error::ApiError;
pub use logs::{LogPage, LogQuery, LogTransport};
pub use reconnect::ReconnectConfig;
pub use socket::{
    DEFAULT_STREAM_URL, LogSocket, RenderSocketConnector, SocketConnector, SocketFrame,
};

// Re-export types that are used in our public API
pub use r4r_types::{Deploy, Job, LogLevel, Owner, Service, ServiceStatus, TimeWindow};
