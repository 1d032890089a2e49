//! In-process event fan-out for the sync core.

pub mod bus;

pub use bus::{BoardEvent, EventBus, Scope};
