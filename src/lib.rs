//! Request/response messaging over one-way message queues
//!
//! The [`producer`] side sends requests tagged with a correlation token and a
//! private response queue, then waits for the matching reply. The
//! [`consumer`] side polls source queues, hands each message to a registered
//! handler and routes any reply back to the sender. Both sides reach the
//! queue service only through a [`transport::QueueTransport`].

pub mod app;
pub mod core;
pub mod consumer;
pub mod demo;
pub mod producer;
pub mod transport;
