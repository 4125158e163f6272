//! Domain layer - pure business logic, no I/O beyond the ports.

pub mod billing;
pub mod foundation;
