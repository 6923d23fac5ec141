//! Background task bookkeeping.

pub mod coordinator;

pub use coordinator::{TaskCoordinator, TaskHandle};
