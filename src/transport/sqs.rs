//! Amazon SQS transport
//!
//! Maps the [`QueueTransport`] operations onto the AWS SDK. Every receive asks
//! for all message and system attributes; every sent attribute is typed
//! `String`. A missing queue on lookup is reported as `Ok(None)`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_sqs::config::{Builder, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName};
use aws_sdk_sqs::Client;

use crate::core::config::{Settings, SqsSettings};
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::message::{MessageAttributes, QueueMessage};
use crate::transport::registry::TransportFuture;
use crate::transport::traits::{QueueTransport, LONG_POLL_SECONDS, MAX_RECEIVE_BATCH};

crate::register_transport!("sqs", sqs_factory);

fn sqs_factory(settings: &Settings) -> TransportFuture {
    let sqs_settings = settings.sqs.clone();
    Box::pin(async move {
        let transport = SqsTransport::from_settings(&sqs_settings).await;
        Ok(Arc::new(transport) as Arc<dyn QueueTransport>)
    })
}

/// SQS-backed implementation of [`QueueTransport`]
#[derive(Clone, Debug)]
pub struct SqsTransport {
    client: Client,
}

impl SqsTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS configuration chain plus overrides
    pub async fn from_settings(settings: &SqsSettings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &settings.endpoint_url {
            log::info!("Using SQS endpoint override {}", endpoint_url);
            loader = loader.endpoint_url(endpoint_url);
        }
        let shared_config = loader.load().await;

        // Bound each attempt slightly above the long-poll wait so a broken
        // stream cannot hang a receive forever
        let client = Client::from_conf(
            Builder::from(&shared_config)
                .timeout_config(
                    TimeoutConfig::builder()
                        .operation_attempt_timeout(Duration::from_secs(LONG_POLL_SECONDS + 2))
                        .build(),
                )
                .build(),
        );
        Self::new(client)
    }

    fn convert_message(message: aws_sdk_sqs::types::Message) -> Option<QueueMessage> {
        let receipt_handle = message.receipt_handle()?.to_string();
        let attributes: MessageAttributes = message
            .message_attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|(key, value)| {
                        value
                            .string_value()
                            .map(|v| (key.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(QueueMessage {
            body: message.body().unwrap_or_default().to_string(),
            receipt_handle,
            attributes,
        })
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn create_queue(&self, name: &str) -> TransportResult<String> {
        log::info!("SQS - Creating queue: {}", name);
        let output = self
            .client
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| TransportError::queue_creation(name, DisplayErrorContext(&e)))?;
        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| TransportError::queue_creation(name, "no queue URL returned"))
    }

    async fn delete_queue(&self, url: &str) -> TransportResult<()> {
        log::info!("SQS - Deleting queue: {}", url);
        self.client
            .delete_queue()
            .queue_url(url)
            .send()
            .await
            .map_err(|e| TransportError::queue_removal(url, DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn get_queue_url(&self, name: &str) -> TransportResult<Option<String>> {
        log::debug!("SQS - Checking queue existence: {}", name);
        match self.client.get_queue_url().queue_name(name).send().await {
            Ok(output) => Ok(output.queue_url().map(str::to_string)),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_queue_does_not_exist())
                    .unwrap_or(false);
                if missing {
                    Ok(None)
                } else {
                    Err(TransportError::queue_lookup(name, DisplayErrorContext(&err)))
                }
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        body: &str,
        attributes: &MessageAttributes,
    ) -> TransportResult<()> {
        log::debug!("SQS - Sending message to {}", url);
        let mut message_attributes = HashMap::with_capacity(attributes.len());
        for (key, value) in attributes {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| TransportError::send(url, e))?;
            message_attributes.insert(key.clone(), attribute);
        }

        self.client
            .send_message()
            .queue_url(url)
            .message_body(body)
            .set_message_attributes((!message_attributes.is_empty()).then_some(message_attributes))
            .send()
            .await
            .map_err(|e| TransportError::send(url, DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn receive(
        &self,
        url: &str,
        max_messages: usize,
        wait_seconds: u64,
    ) -> TransportResult<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(url)
            .max_number_of_messages(max_messages.clamp(1, MAX_RECEIVE_BATCH) as i32)
            .wait_time_seconds(wait_seconds as i32)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| TransportError::poll(url, DisplayErrorContext(&e)))?;

        let messages: Vec<QueueMessage> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let converted = Self::convert_message(message);
                if converted.is_none() {
                    log::warn!("SQS - Dropping message without receipt handle from {}", url);
                }
                converted
            })
            .collect();
        log::debug!("SQS - Received {} messages from {}", messages.len(), url);
        Ok(messages)
    }

    async fn delete_message(&self, url: &str, receipt_handle: &str) -> TransportResult<()> {
        log::debug!("SQS - Deleting message with receipt handle: {}", receipt_handle);
        self.client
            .delete_message()
            .queue_url(url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| TransportError::ack(url, DisplayErrorContext(&e)))?;
        Ok(())
    }
}
