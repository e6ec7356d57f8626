//! Single-writer router actor.
//!
//! The RouterActor owns the [`AggregateRouter`] and processes one message at a
//! time, so every load/apply/save cycle is serialized. Routed events are
//! broadcast to observers.

use crate::domain::{AnyAggregate, Event, EventRequest, RouteError, StoreError};
use crate::router::AggregateRouter;
use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Capacity of the routed-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type RouteReply = oneshot::Sender<Result<(AnyAggregate, Event), RouteError>>;

/// Messages that can be sent to the router actor.
pub enum RouterMessage {
    /// Route an event and reply with the updated aggregate.
    Route(Box<EventRequest>, RouteReply),
    /// Load the current state of an aggregate.
    Load(
        String,
        oneshot::Sender<Result<Option<AnyAggregate>, StoreError>>,
    ),
}

/// Arguments for spawning a router actor.
pub struct RouterActorArgs {
    pub router: AggregateRouter,
    /// Broadcast channel sender for routed events.
    pub event_tx: broadcast::Sender<Event>,
}

/// State maintained by the router actor.
pub struct RouterActorState {
    router: AggregateRouter,
    event_tx: broadcast::Sender<Event>,
}

/// The router actor.
pub struct RouterActor;

#[async_trait]
impl Actor for RouterActor {
    type Msg = RouterMessage;
    type State = RouterActorState;
    type Arguments = RouterActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(RouterActorState {
            router: args.router,
            event_tx: args.event_tx,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RouterMessage::Route(request, reply) => {
                let result = state.router.route(*request).await;
                if let Ok((_, event)) = &result {
                    // No subscribers is fine.
                    let _ = state.event_tx.send(event.clone());
                }
                if reply.send(result).is_err() {
                    tracing::debug!("Route reply channel closed");
                }
            }
            RouterMessage::Load(aggregate_id, reply) => {
                let result = state.router.load(&aggregate_id).await;
                if reply.send(result).is_err() {
                    tracing::debug!("Load reply channel closed");
                }
            }
        }

        Ok(())
    }
}

/// Cloneable handle to a running router actor.
#[derive(Clone)]
pub struct RouterHandle {
    actor: ActorRef<RouterMessage>,
    event_tx: broadcast::Sender<Event>,
}

impl RouterHandle {
    /// Spawns the actor and returns its handle plus the actor's join handle.
    pub async fn spawn(router: AggregateRouter) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let args = RouterActorArgs {
            router,
            event_tx: event_tx.clone(),
        };
        let (actor, join) = RouterActor::spawn(None, RouterActor, args)
            .await
            .map_err(|e| anyhow::anyhow!("failed to spawn router actor: {}", e))?;
        Ok((Self { actor, event_tx }, join))
    }

    /// Routes `request` through the single writer.
    pub async fn route(&self, request: EventRequest) -> Result<(AnyAggregate, Event), RouteError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.actor
            .send_message(RouterMessage::Route(Box::new(request), reply_tx))
            .map_err(|e| RouteError::RouterUnavailable(e.to_string()))?;
        reply_rx
            .await
            .map_err(|_| RouteError::RouterUnavailable("reply dropped".to_string()))?
    }

    pub async fn load(&self, aggregate_id: &str) -> Result<Option<AnyAggregate>, RouteError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.actor
            .send_message(RouterMessage::Load(aggregate_id.to_string(), reply_tx))
            .map_err(|e| RouteError::RouterUnavailable(e.to_string()))?;
        let loaded = reply_rx
            .await
            .map_err(|_| RouteError::RouterUnavailable("reply dropped".to_string()))?;
        Ok(loaded?)
    }

    /// Subscribes to events routed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stops the actor after its current message.
    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

#[cfg(test)]
#[path = "tests/actor_tests.rs"]
mod tests;
