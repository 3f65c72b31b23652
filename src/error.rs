use crate::gateway::GatewayError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} failed: {source}")]
    Gateway {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("{operation} timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl StoreError {
    pub fn operation(&self) -> &'static str {
        match self {
            StoreError::Gateway { operation, .. } | StoreError::Timeout { operation, .. } => {
                operation
            }
        }
    }

    /// Error code used on the IPC wire.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Gateway { source, .. } => source.code(),
            StoreError::Timeout { .. } => "gateway_timeout",
        }
    }
}
