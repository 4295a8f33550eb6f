//! Batch dispatch
//!
//! Runs a listener's handler over one received batch. For every message:
//! run the handler, route its reply if there is one, acknowledge the message,
//! then pad out to the listener's minimum processing time. Handler failures
//! and panics are logged and treated as "no reply"; the message is
//! acknowledged regardless.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::consumer::handler::MessageHandler;
use crate::consumer::registry::ListenerDescriptor;
use crate::consumer::reply::{ReplyOutcome, ReplyRouter};
use crate::transport::{QueueMessage, QueueTransport};

/// Counts for one dispatched batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub processed: usize,
    pub replies_sent: usize,
    pub handler_failures: usize,
    pub ack_failures: usize,
}

impl DispatchSummary {
    fn record(&mut self, report: MessageReport) {
        self.processed += 1;
        self.replies_sent += usize::from(report.replied);
        self.handler_failures += usize::from(report.handler_failed);
        self.ack_failures += usize::from(report.ack_failed);
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MessageReport {
    replied: bool,
    handler_failed: bool,
    ack_failed: bool,
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn QueueTransport>,
    router: ReplyRouter,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self {
            router: ReplyRouter::new(Arc::clone(&transport)),
            transport,
        }
    }

    /// Process `batch` with the descriptor's handler and pacing
    ///
    /// Sequential listeners handle messages strictly in received order, each
    /// one acknowledged before the next starts. Parallel listeners run one
    /// task per message.
    pub async fn dispatch(
        &self,
        descriptor: &ListenerDescriptor,
        batch: Vec<QueueMessage>,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        log::debug!(
            "Dispatching {} message(s) from {}",
            batch.len(),
            descriptor.source_queue_url
        );

        if descriptor.parallel {
            let mut tasks = JoinSet::new();
            for message in batch {
                let dispatcher = self.clone();
                let handler = Arc::clone(&descriptor.handler);
                let source_url = descriptor.source_queue_url.clone();
                let min_processing = descriptor.min_processing;
                tasks.spawn(async move {
                    dispatcher
                        .process_message(&source_url, handler, min_processing, message)
                        .await
                });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(report) => summary.record(report),
                    Err(e) => log::error!("Message task ended abnormally: {}", e),
                }
            }
        } else {
            for message in batch {
                let report = self
                    .process_message(
                        &descriptor.source_queue_url,
                        Arc::clone(&descriptor.handler),
                        descriptor.min_processing,
                        message,
                    )
                    .await;
                summary.record(report);
            }
        }
        summary
    }

    async fn process_message(
        &self,
        source_url: &str,
        handler: Arc<dyn MessageHandler>,
        min_processing: Duration,
        message: QueueMessage,
    ) -> MessageReport {
        let started = Instant::now();
        let mut report = MessageReport::default();

        // Own task so a panicking handler cannot take the listener down
        let body = message.body.clone();
        let outcome = tokio::spawn(async move { handler.process(&body).await }).await;
        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                log::warn!("Handler for {} failed: {}", source_url, e);
                report.handler_failed = true;
                None
            }
            Err(e) => {
                log::error!("Handler for {} panicked: {}", source_url, e);
                report.handler_failed = true;
                None
            }
        };

        match reply {
            Some(reply) if !reply.is_empty() => {
                report.replied = matches!(
                    self.router.route(&message, &reply).await,
                    ReplyOutcome::Sent
                );
            }
            _ => log::trace!("No reply for message {}", message.receipt_handle),
        }

        if let Err(e) = self
            .transport
            .delete_message(source_url, &message.receipt_handle)
            .await
        {
            log::warn!("Acknowledgement failed, message may be redelivered: {}", e);
            report.ack_failed = true;
        }

        let elapsed = started.elapsed();
        if elapsed < min_processing {
            tokio::time::sleep(min_processing - elapsed).await;
        }
        report
    }
}
