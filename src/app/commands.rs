//! Subcommand implementations
//!
//! Each command receives the transport built from the configured provider
//! and the resolved settings. Output meant for the operator goes to stdout;
//! everything else goes through the logger.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::app::error::{AppError, AppResult};
use crate::consumer::{ListenerOrchestrator, ListenerRegistry, ListenerResult, PollCounts};
use crate::core::config::Settings;
use crate::core::shutdown::ShutdownCoordinator;
use crate::demo::{
    CoordinateQueryListener, CoordinateReply, CoordinateSubmissionListener, CoordinatesClient,
    CoordinatesRepository, QueryStatus, ONEWAY_QUEUE_PROPERTY, TWOWAYS_QUEUE_PROPERTY,
};
use crate::producer::ResponseBroker;
use crate::transport::QueueTransport;

/// Queues created by `demo` when the configuration names none
const DEMO_QUEUES: [(&str, &str); 2] = [
    (TWOWAYS_QUEUE_PROPERTY, "qrelay-demo-twoways"),
    (ONEWAY_QUEUE_PROPERTY, "qrelay-demo-oneway"),
];

/// Listener long poll used by `demo`, so stopping at the end is quick
const DEMO_LONG_POLL_SECONDS: u64 = 1;

/// Cities queried by `demo`; the last one is not in the seeded repository
const DEMO_CITIES: [&str; 3] = ["Santiago", "Coquimbo", "Atlantis"];

/// Register both coordinate listeners against `repository`
pub fn coordinate_listeners(
    settings: &Settings,
    repository: Arc<CoordinatesRepository>,
) -> ListenerResult<ListenerRegistry> {
    let mut registry = ListenerRegistry::new();
    registry.register_bound(settings, CoordinateQueryListener::new(Arc::clone(&repository)))?;
    registry.register_bound(settings, CoordinateSubmissionListener::new(repository))?;
    Ok(registry)
}

/// Serve coordinate queries and submissions until a shutdown signal
pub async fn listen(transport: Arc<dyn QueueTransport>, settings: &Settings) -> AppResult<()> {
    let repository = Arc::new(CoordinatesRepository::seeded());
    let registry = coordinate_listeners(settings, repository)?;
    let orchestrator = ListenerOrchestrator::new(transport, registry, settings.listeners.clone());

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    orchestrator.start()?;
    log::info!("Listening; press Ctrl-C to stop");
    shutdown.wait().await;

    let counts = orchestrator.stop().await;
    log_poll_counts(&counts);
    Ok(())
}

/// Query one city and print the answer
pub async fn query(
    transport: Arc<dyn QueueTransport>,
    settings: &Settings,
    city: &str,
    timeout: Option<Duration>,
) -> AppResult<()> {
    let broker = ResponseBroker::start(transport, settings.broker.clone()).await;
    let outcome = async {
        let client = CoordinatesClient::from_settings(broker.clone(), settings)?;
        let timeout = timeout.unwrap_or_else(|| client.timeout());
        let reply = client.query_coordinates_within(city, timeout).await?;
        println!("{}", format_reply(city, reply.as_ref()));
        Ok::<(), AppError>(())
    }
    .await;
    broker.shutdown().await;
    outcome
}

/// Submit one set of coordinates
pub async fn submit(
    transport: Arc<dyn QueueTransport>,
    settings: &Settings,
    name: &str,
    lat: f64,
    lon: f64,
) -> AppResult<()> {
    let broker = ResponseBroker::new(transport, settings.broker.clone());
    let outcome = async {
        let client = CoordinatesClient::from_settings(broker.clone(), settings)?;
        client.submit_coordinates(name, lat, lon).await?;
        println!("Submitted {} ({}, {})", name, lat, lon);
        Ok::<(), AppError>(())
    }
    .await;
    broker.shutdown().await;
    outcome
}

/// Run the listeners and a client side by side in this process
///
/// Missing queue URLs are filled in with freshly created queues, so the
/// demo runs as-is on the `memory` provider.
pub async fn demo(transport: Arc<dyn QueueTransport>, settings: &Settings) -> AppResult<()> {
    let mut settings = settings.clone();
    settings.listeners.long_poll_seconds = settings
        .listeners
        .long_poll_seconds
        .min(DEMO_LONG_POLL_SECONDS);
    for (property, queue_name) in DEMO_QUEUES {
        if settings.property(property).is_none() {
            let url = transport.create_queue(queue_name).await?;
            log::info!("Created {} for {}", url, property);
            settings.set_property(property, url);
        }
    }

    let repository = Arc::new(CoordinatesRepository::seeded());
    let registry = coordinate_listeners(&settings, Arc::clone(&repository))?;
    let orchestrator =
        ListenerOrchestrator::new(Arc::clone(&transport), registry, settings.listeners.clone());
    orchestrator.start()?;

    let broker = ResponseBroker::start(transport, settings.broker.clone()).await;
    let outcome = match CoordinatesClient::from_settings(broker.clone(), &settings) {
        Ok(client) => run_demo(&client, &repository).await,
        Err(e) => Err(e.into()),
    };

    broker.shutdown().await;
    let counts = orchestrator.stop().await;
    log_poll_counts(&counts);
    outcome
}

async fn run_demo(client: &CoordinatesClient, repository: &CoordinatesRepository) -> AppResult<()> {
    let replies =
        futures::future::join_all(DEMO_CITIES.iter().map(|city| client.query_coordinates(city)))
            .await;
    for (city, reply) in DEMO_CITIES.iter().zip(replies) {
        println!("{}", format_reply(city, reply?.as_ref()));
    }

    let (name, lat, lon) = ("Valparaiso", -33.0472, -71.6127);
    client.submit_coordinates(name, lat, lon).await?;
    println!("Submitted {} ({}, {})", name, lat, lon);

    // The submission is one-way; wait for the listener to store it
    let deadline = tokio::time::Instant::now() + client.timeout();
    while repository.find(name).is_none() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let reply = client.query_coordinates(name).await?;
    println!("{}", format_reply(name, reply.as_ref()));
    Ok(())
}

/// One-line rendering of a query outcome
pub fn format_reply(city: &str, reply: Option<&CoordinateReply>) -> String {
    match reply {
        None => format!("{}: {}", city, "no reply".yellow()),
        Some(reply) => match (reply.status, reply.lat, reply.lon) {
            (QueryStatus::Ok, Some(lat), Some(lon)) => {
                format!("{}: {} ({}, {})", city, "OK".green(), lat, lon)
            }
            (QueryStatus::NoResults, ..) => format!("{}: {}", city, "NO_RESULTS".yellow()),
            _ => format!("{}: {}", city, "INTERNAL_SERVER_ERROR".red()),
        },
    }
}

fn log_poll_counts(counts: &PollCounts) {
    let mut urls: Vec<&String> = counts.keys().collect();
    urls.sort();
    for url in urls {
        log::info!("{}: {} polls", url, counts[url]);
    }
}
