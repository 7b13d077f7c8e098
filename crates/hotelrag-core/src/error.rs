use std::time::Duration;
use thiserror::Error;

use crate::types::Route;

/// Failure kinds reported by the model clients. Provider-specific errors are
/// translated into these variants before leaving the client.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("provider rate limited the request")]
    RateLimited,

    #[error("provider request timed out")]
    Timeout,

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl ModelError {
    /// Rate-limit and timeout failures are retried with backoff; nothing else is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("route {route} failed: {reason}")]
    UpstreamRoute { route: Route, reason: String },

    #[error("all {attempts} retrieval route calls failed")]
    AllRoutesFailed { attempts: usize },

    #[error("generation failed: {0}")]
    Generation(#[source] ModelError),

    #[error("service is not ready: {0}")]
    NotReady(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn route_timeout(route: Route, after: Duration) -> Self {
        Self::UpstreamRoute { route, reason: format!("timed out after {}ms", after.as_millis()) }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
