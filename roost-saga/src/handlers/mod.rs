pub mod availability;
pub mod booking;

pub use availability::AvailabilityEventHandler;
pub use booking::BookingEventHandler;
