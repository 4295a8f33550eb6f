//! Handler traits implemented by application code

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::consumer::error::HandlerError;
use crate::transport::MAX_RECEIVE_BATCH;

/// Processes one message body, optionally producing a reply
///
/// `Ok(None)` means the message was one-way. Handlers may see the same
/// message more than once and should be idempotent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process(&self, body: &str) -> Result<Option<String>, HandlerError>;
}

/// A handler that declares which queue it listens on
///
/// The queue URL itself lives in configuration under
/// [`ListenerBinding::url_property`], so the same listener can be pointed at
/// different queues per deployment.
pub trait QueueListener: MessageHandler {
    fn binding(&self) -> ListenerBinding;
}

/// Registration options a [`QueueListener`] carries with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerBinding {
    /// Configuration key holding the source queue URL
    pub url_property: String,
    pub parallel: bool,
    pub max_batch: usize,
    pub min_processing: Duration,
}

impl ListenerBinding {
    /// Sequential, full-size batches, no minimum processing time
    pub fn new(url_property: impl Into<String>) -> Self {
        Self {
            url_property: url_property.into(),
            parallel: false,
            max_batch: MAX_RECEIVE_BATCH,
            min_processing: Duration::ZERO,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn min_processing(mut self, min_processing: Duration) -> Self {
        self.min_processing = min_processing;
        self
    }
}

/// Handler built from an async closure, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure taking the message body as a [`MessageHandler`]
///
/// # Example
///
/// ```rust
/// use qrelay::consumer::{handler_fn, MessageHandler};
///
/// # async fn example() {
/// let echo = handler_fn(|body: String| async move { Ok(Some(body)) });
/// assert_eq!(echo.process("ping").await.unwrap().as_deref(), Some("ping"));
/// # }
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>, HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, HandlerError>> + Send + 'static,
{
    async fn process(&self, body: &str) -> Result<Option<String>, HandlerError> {
        (self.f)(body.to_string()).await
    }
}
