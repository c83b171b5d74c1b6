pub mod gate;
pub mod interval;
pub mod memory;
pub mod models;
pub mod store;

pub use gate::AvailabilityGate;
pub use interval::Interval;
pub use memory::InMemorySlotStore;
pub use models::{BookingDetails, CommissionSplit, HoldToken, Reservation, ReservationStatus};
pub use store::{GateError, SlotStore};
