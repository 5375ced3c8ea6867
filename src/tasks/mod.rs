//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry Sweep: physically removes expired cache entries at a fixed interval

mod sweep;

pub use sweep::spawn_sweep_task;
