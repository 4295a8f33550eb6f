//! Consumer side: listeners that poll queues and answer requests
//!
//! Application code implements [`MessageHandler`] (or [`QueueListener`] to
//! carry its own queue binding), registers it in a [`ListenerRegistry`] and
//! hands the registry to a [`ListenerOrchestrator`].

mod dispatcher;
mod error;
mod handler;
mod orchestrator;
mod registry;
mod reply;

pub use dispatcher::{DispatchSummary, Dispatcher};
pub use error::{HandlerError, ListenerError, ListenerResult};
pub use handler::{handler_fn, FnHandler, ListenerBinding, MessageHandler, QueueListener};
pub use orchestrator::{ListenerOrchestrator, OrchestratorSettings, PollCounts};
pub use registry::{ListenerDescriptor, ListenerRegistry};
pub use reply::{ReplyOutcome, ReplyRouter};

#[cfg(test)]
mod tests;
