//! Destinations for agent lifecycle events.

use crate::domain::{EventRequest, RouteError};
use crate::router::RouterHandle;
use crate::stream::{EventApiClient, StreamError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Api(#[from] StreamError),
}

#[async_trait]
pub trait LifecycleSink: Send + Sync {
    async fn emit(&self, request: EventRequest) -> Result<(), SinkError>;
}

/// Routes lifecycle events into the local aggregates.
#[async_trait]
impl LifecycleSink for RouterHandle {
    async fn emit(&self, request: EventRequest) -> Result<(), SinkError> {
        self.route(request).await?;
        Ok(())
    }
}

/// Submits lifecycle events to the event API.
#[async_trait]
impl LifecycleSink for EventApiClient {
    async fn emit(&self, request: EventRequest) -> Result<(), SinkError> {
        self.emit_event(&request).await?;
        Ok(())
    }
}
