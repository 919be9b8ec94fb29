mod actors;
mod app_system;
mod bus;
mod clients;
mod config;
mod domain;
mod error;
mod http;
mod messages;
mod payments;
mod store;

#[cfg(test)]
mod mock_framework;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app_system::{setup_tracing, Backends, OrderSystem};
use crate::bus::{InMemoryBus, Publisher, Subscriber};
use crate::clients::UserClient;
use crate::config::{BusConfig, CliArgs, ServiceConfig, StoreConfig};
use crate::http::{AppState, AuthServiceVerifier};
use crate::store::{InMemoryStore, ItemStore, OrderStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_args(CliArgs::parse())?;
    setup_tracing(config.log_format);

    info!(bind = %config.bind, store = config.store.kind(), "Starting order service");

    let (item_store, order_store) = open_store(&config.store).await?;
    let (publisher, payments) = open_bus(&config).await?;
    let users = UserClient::new(
        config.user_service_url.clone(),
        config.http_timeout,
        config.credentials.clone(),
    )
    .context("building user service client")?;
    let verifier = AuthServiceVerifier::new(config.auth_validate_url.clone(), config.http_timeout)
        .context("building auth service client")?;

    let system = OrderSystem::start(
        config.mailbox_size,
        config.order_topic.clone(),
        Backends {
            item_store,
            order_store,
            users: Arc::new(users),
            publisher,
            payments,
        },
    );

    let router = http::router(AppState {
        items: system.item_client.clone(),
        orders: system.order_client.clone(),
        verifier: Arc::new(verifier),
    });
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(bind = %listener.local_addr()?, "Listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server failed");
    }

    system.shutdown().await.map_err(anyhow::Error::msg)?;
    info!("Order service stopped");
    served.context("serving HTTP")
}

async fn open_store(
    store: &StoreConfig,
) -> anyhow::Result<(Arc<dyn ItemStore>, Arc<dyn OrderStore>)> {
    match store {
        StoreConfig::Memory => {
            let store = InMemoryStore::new();
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        StoreConfig::Postgres {
            url,
            max_connections,
        } => {
            let store = PgStore::connect(url, *max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            store.migrate().await.context("migrating schema")?;
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
    }
}

async fn open_bus(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<dyn Publisher>, Box<dyn Subscriber>)> {
    match &config.bus {
        BusConfig::Memory => {
            let bus = InMemoryBus::new();
            let payments = bus.subscribe(config.payment_topic.clone()).await;
            Ok((Arc::new(bus), Box::new(payments)))
        }
        #[cfg(feature = "kafka")]
        BusConfig::Kafka { brokers, group_id } => {
            use crate::bus::kafka::{KafkaPublisher, KafkaSubscriber};

            let publisher = KafkaPublisher::new(brokers)?;
            let payments = KafkaSubscriber::new(brokers, group_id, &config.payment_topic)?;
            Ok((Arc::new(publisher), Box::new(payments)))
        }
        #[cfg(not(feature = "kafka"))]
        BusConfig::Kafka { .. } => anyhow::bail!("built without the `kafka` feature"),
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
