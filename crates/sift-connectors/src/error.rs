//! Typed errors for the connectors crate.

use std::fmt;

/// Errors that can occur when talking to the external services.
#[derive(Debug)]
pub enum ConnectorError {
    /// An object store operation (list, head, get) failed.
    ObjectStore(String),
    /// A message bus operation (send, receive, delete) failed.
    Queue(String),
    /// A durable-loop execution operation failed.
    Execution(String),
    /// Invalid or missing configuration.
    Config(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::ObjectStore(msg) => write!(f, "object store error: {}", msg),
            ConnectorError::Queue(msg) => write!(f, "queue error: {}", msg),
            ConnectorError::Execution(msg) => write!(f, "execution error: {}", msg),
            ConnectorError::Config(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}
