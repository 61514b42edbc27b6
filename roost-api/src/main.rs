use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roost_api::{app, cdc, AppState};
use roost_saga::handlers::{AvailabilityEventHandler, BookingEventHandler};
use roost_saga::{
    run_dlq_monitor, DeadLetterPublisher, DeadLetterQueue, EventProcessor, LockManager,
    RetryingProcessor, SagaConsumer, SagaProcessor, SagaPublisher,
};
use roost_store::{
    AvailabilityStore, BookingStore, DbClient, EventQueue, LockStore, PgAvailabilityStore,
    PgBookingStore, PgPropertyStore, PgUserStore, ReadModelCache, ReadModelRepository, RedisClient,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roost_api=debug,roost_saga=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = roost_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting Roost API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let bookings = PgBookingStore::new(db.pool.clone());
    let properties = PgPropertyStore::new(db.pool.clone());
    let users = PgUserStore::new(db.pool.clone());
    let availability = PgAvailabilityStore::new(db.pool.clone());
    let read_models = ReadModelRepository::new(
        Arc::clone(&redis) as Arc<dyn ReadModelCache>,
        config.keys.clone(),
    );

    let publisher = SagaPublisher::new(
        Arc::clone(&redis) as Arc<dyn EventQueue>,
        config.keys.saga_queue.clone(),
    );
    let locks = LockManager::new(
        Arc::clone(&redis) as Arc<dyn LockStore>,
        Arc::new(availability.clone()) as Arc<dyn AvailabilityStore>,
        config.keys.clone(),
        &config.locks,
    );

    let processor = SagaProcessor::new(
        BookingEventHandler::new(
            Arc::new(bookings.clone()) as Arc<dyn BookingStore>,
            publisher.clone(),
        ),
        AvailabilityEventHandler::new(
            Arc::new(availability.clone()) as Arc<dyn AvailabilityStore>,
            locks.clone(),
            publisher.clone(),
        ),
    );
    let retry = Arc::new(RetryingProcessor::new(
        Arc::new(processor) as Arc<dyn EventProcessor>,
        DeadLetterPublisher::new(
            Arc::clone(&redis) as Arc<dyn EventQueue>,
            config.keys.dlq_queue.clone(),
        ),
        &config.saga,
    ));

    let consumer = SagaConsumer::new(
        Arc::clone(&redis) as Arc<dyn EventQueue>,
        config.keys.saga_queue.clone(),
        Arc::clone(&retry),
        &config.saga,
    );
    tokio::spawn(consumer.run());

    tokio::spawn(run_dlq_monitor(
        Arc::clone(&redis) as Arc<dyn EventQueue>,
        config.keys.dlq_queue.clone(),
        Duration::from_secs(config.saga.dlq_monitor_interval_secs),
    ));

    cdc::spawn_cdc_workers(&config.kafka, read_models.clone());

    let dlq = Arc::new(DeadLetterQueue::new(
        Arc::clone(&redis) as Arc<dyn EventQueue>,
        config.keys.dlq_queue.clone(),
        retry,
    ));

    let state = AppState {
        bookings,
        properties,
        users,
        availability,
        read_models,
        locks,
        publisher,
        dlq,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app(state)).await.unwrap();
}
