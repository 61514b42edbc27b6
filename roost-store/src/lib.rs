pub mod availability_repo;
pub mod backend;
pub mod booking_repo;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod property_repo;
pub mod redis_store;
pub mod user_repo;

pub use availability_repo::PgAvailabilityStore;
pub use backend::{AvailabilityStore, BookOutcome, BookingStore, EventQueue, LockStore, ReadModelCache};
pub use booking_repo::PgBookingStore;
pub use cache::ReadModelRepository;
pub use config::{Config, KeySpace};
pub use database::DbClient;
pub use error::StoreError;
pub use property_repo::PgPropertyStore;
pub use redis_store::RedisClient;
pub use user_repo::PgUserStore;
