//! From events to agent work: dispatch rules, the priority queue, the
//! bounded scheduler and the task executor.

pub mod dispatcher;
pub mod executor;
pub mod handlers;
pub mod queue;
pub mod scheduler;
pub mod sink;
pub mod work_item;

pub use dispatcher::Dispatcher;
pub use executor::{
    AgentIdentity, ExecutionPath, ExecutorSettings, TaskExecutor, WorkExecutor, WorkOutcome,
};
pub use handlers::HandlerRegistry;
pub use queue::WorkQueue;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStats};
pub use sink::{LifecycleSink, SinkError};
pub use work_item::WorkItem;
