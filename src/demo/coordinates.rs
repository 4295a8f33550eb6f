//! City coordinates over request/response queues

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::consumer::{HandlerError, ListenerBinding, MessageHandler, QueueListener};
use crate::core::config::Settings;
use crate::core::error_handling::ContextualError;
use crate::producer::{BrokerError, ResponseBroker};

/// Configuration key of the queue carrying coordinate queries
pub const TWOWAYS_QUEUE_PROPERTY: &str = "twoways.queue.url";

/// Configuration key of the queue carrying coordinate submissions
pub const ONEWAY_QUEUE_PROPERTY: &str = "oneway.queue.url";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateQuery {
    pub city: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NO_RESULTS")]
    NoResults,
    #[serde(rename = "INTERNAL_SERVER_ERROR")]
    InternalServerError,
}

/// Answer to a [`CoordinateQuery`]; position fields are set only when found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    pub status: QueryStatus,
}

impl CoordinateReply {
    pub fn found(coordinates: Coordinates) -> Self {
        Self {
            name: Some(coordinates.name),
            lat: Some(coordinates.lat),
            lon: Some(coordinates.lon),
            status: QueryStatus::Ok,
        }
    }

    pub fn status(status: QueryStatus) -> Self {
        Self {
            name: None,
            lat: None,
            lon: None,
            status,
        }
    }
}

/// In-memory city table; lookups are case-sensitive
#[derive(Debug, Default)]
pub struct CoordinatesRepository {
    cities: RwLock<HashMap<String, Coordinates>>,
}

impl CoordinatesRepository {
    /// Repository preloaded with Santiago and Coquimbo
    pub fn seeded() -> Self {
        let repository = Self::default();
        repository.save(Coordinates {
            name: "Santiago".to_string(),
            lat: -33.45,
            lon: -70.67,
        });
        repository.save(Coordinates {
            name: "Coquimbo".to_string(),
            lat: -30.657041,
            lon: -71.8844573,
        });
        repository
    }

    pub fn find(&self, city: &str) -> Option<Coordinates> {
        self.cities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(city)
            .cloned()
    }

    /// Insert or replace the entry for `coordinates.name`
    pub fn save(&self, coordinates: Coordinates) {
        self.cities
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(coordinates.name.clone(), coordinates);
    }

    pub fn len(&self) -> usize {
        self.cities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Two-way listener answering [`CoordinateQuery`] messages
///
/// Every request gets a reply, including malformed ones, which are answered
/// with `INTERNAL_SERVER_ERROR`.
pub struct CoordinateQueryListener {
    repository: Arc<CoordinatesRepository>,
}

impl CoordinateQueryListener {
    pub fn new(repository: Arc<CoordinatesRepository>) -> Self {
        Self { repository }
    }

    fn answer(&self, body: &str) -> CoordinateReply {
        match serde_json::from_str::<CoordinateQuery>(body) {
            Ok(query) => match self.repository.find(&query.city) {
                Some(coordinates) => CoordinateReply::found(coordinates),
                None => CoordinateReply::status(QueryStatus::NoResults),
            },
            Err(e) => {
                log::warn!("Unreadable coordinate query: {}", e);
                CoordinateReply::status(QueryStatus::InternalServerError)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for CoordinateQueryListener {
    async fn process(&self, body: &str) -> Result<Option<String>, HandlerError> {
        let reply = self.answer(body);
        log::info!("Coordinate query answered with {:?}", reply.status);
        Ok(Some(serde_json::to_string(&reply)?))
    }
}

impl QueueListener for CoordinateQueryListener {
    fn binding(&self) -> ListenerBinding {
        ListenerBinding::new(TWOWAYS_QUEUE_PROPERTY).min_processing(Duration::from_millis(20))
    }
}

/// One-way listener storing submitted [`Coordinates`]
pub struct CoordinateSubmissionListener {
    repository: Arc<CoordinatesRepository>,
}

impl CoordinateSubmissionListener {
    pub fn new(repository: Arc<CoordinatesRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl MessageHandler for CoordinateSubmissionListener {
    async fn process(&self, body: &str) -> Result<Option<String>, HandlerError> {
        let coordinates: Coordinates = serde_json::from_str(body)?;
        log::info!(
            "Storing coordinates for {} ({}, {})",
            coordinates.name,
            coordinates.lat,
            coordinates.lon
        );
        self.repository.save(coordinates);
        Ok(None)
    }
}

impl QueueListener for CoordinateSubmissionListener {
    fn binding(&self) -> ListenerBinding {
        ListenerBinding::new(ONEWAY_QUEUE_PROPERTY)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Configuration property '{property}' is not set")]
    MissingProperty { property: String },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Malformed coordinates message: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContextualError for ClientError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, ClientError::MissingProperty { .. })
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

/// Producer-side client for the coordinates service
pub struct CoordinatesClient {
    broker: ResponseBroker,
    twoways_url: String,
    oneway_url: String,
    timeout: Duration,
}

impl CoordinatesClient {
    pub fn new(
        broker: ResponseBroker,
        twoways_url: impl Into<String>,
        oneway_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            broker,
            twoways_url: twoways_url.into(),
            oneway_url: oneway_url.into(),
            timeout,
        }
    }

    /// Client using the queue URLs and reply timeout from `settings`
    pub fn from_settings(broker: ResponseBroker, settings: &Settings) -> Result<Self, ClientError> {
        let lookup = |property: &str| {
            settings
                .property(property)
                .map(str::to_string)
                .ok_or_else(|| ClientError::MissingProperty {
                    property: property.to_string(),
                })
        };
        Ok(Self::new(
            broker,
            lookup(TWOWAYS_QUEUE_PROPERTY)?,
            lookup(ONEWAY_QUEUE_PROPERTY)?,
            settings.broker.reply_timeout,
        ))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask for the coordinates of `city`; `None` when no reply came in time
    pub async fn query_coordinates(&self, city: &str) -> Result<Option<CoordinateReply>, ClientError> {
        self.query_coordinates_within(city, self.timeout).await
    }

    pub async fn query_coordinates_within(
        &self,
        city: &str,
        timeout: Duration,
    ) -> Result<Option<CoordinateReply>, ClientError> {
        let request = serde_json::to_string(&CoordinateQuery {
            city: city.to_string(),
        })?;
        let token = self
            .broker
            .send_for_response(&self.twoways_url, &request)
            .await?;
        match self.broker.receive_response(&token, timeout).await {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => {
                log::warn!("No coordinates reply for {} within {:?}", city, timeout);
                Ok(None)
            }
        }
    }

    /// Submit coordinates without waiting for any answer
    pub async fn submit_coordinates(&self, name: &str, lat: f64, lon: f64) -> Result<(), ClientError> {
        let body = serde_json::to_string(&Coordinates {
            name: name.to_string(),
            lat,
            lon,
        })?;
        self.broker.send_fire_and_forget(&self.oneway_url, &body).await?;
        Ok(())
    }
}
