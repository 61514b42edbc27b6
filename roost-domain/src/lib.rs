pub mod availability;
pub mod booking;
pub mod property;
pub mod read_models;
pub mod saga;
pub mod user;

pub use booking::{Booking, BookingStatus};
pub use saga::{DeadLetterEvent, SagaEvent, SagaEventType};
