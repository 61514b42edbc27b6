use std::sync::Arc;

use roost_saga::{DeadLetterQueue, LockManager, SagaPublisher};
use roost_store::{
    PgAvailabilityStore, PgBookingStore, PgPropertyStore, PgUserStore, ReadModelRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub bookings: PgBookingStore,
    pub properties: PgPropertyStore,
    pub users: PgUserStore,
    pub availability: PgAvailabilityStore,
    pub read_models: ReadModelRepository,
    pub locks: LockManager,
    pub publisher: SagaPublisher,
    pub dlq: Arc<DeadLetterQueue>,
}
