use crate::config::Config;
use crate::services::MirrorTransport;
use crate::storage::{Catalog, InMemoryStorage, KeyValueStorage, OnDiskStorage};
use actix_rt::signal::unix;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use download_core::{DownloadPipeline, EventBus, SlotBroker};
use futures_lite::FutureExt;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod http;
mod services;
mod storage;
mod types;
mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    let mut terminate = unix::signal(unix::SignalKind::terminate())?;
    let mut interrupt = unix::signal(unix::SignalKind::interrupt())?;

    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env()
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error))?;

    info!(version = VERSION, "Starting application...");

    let storage: Arc<dyn KeyValueStorage> = match &config.catalog_directory {
        Some(directory) => Arc::new(OnDiskStorage::create(directory.clone())),
        None => Arc::new(InMemoryStorage::new()),
    };
    let catalog = Arc::new(Catalog::new(storage));
    let broker = Arc::new(SlotBroker::new(config.broker_config()));
    let bus = Arc::new(EventBus::new());
    let transport = MirrorTransport::create(
        config.mirror_directory.clone(),
        config.download_directory.clone(),
    );

    let pipeline = Arc::new(DownloadPipeline::new(
        Arc::clone(&broker),
        Arc::clone(&bus),
        Arc::clone(&catalog) as _,
        Arc::new(transport),
    ));

    let shutdown_timeout = config.shutdown_timeout;
    let bind_address = config.bind_address.clone();

    let server = HttpServer::new({
        let broker = Arc::clone(&broker);

        move || {
            App::new()
                .app_data(Data::new(Arc::clone(&catalog)))
                .app_data(Data::new(Arc::clone(&broker)))
                .app_data(Data::new(Arc::clone(&bus)))
                .app_data(Data::new(Arc::clone(&pipeline)))
                .configure(http::configure)
        }
    })
    .shutdown_timeout(shutdown_timeout)
    .bind(bind_address)?
    .run();

    let server_handle = server.handle();

    actix_rt::spawn({
        async move {
            if let Err(error) = server.await {
                error!(?error, "Error on http server");
            }
        }
    });

    info!("Application started");

    interrupt.recv().or(terminate.recv()).await;

    info!("Received shutdown signal. Shutting down gracefully...");

    server_handle.stop(true).await;
    broker.reset();

    Ok(())
}
