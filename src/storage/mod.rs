// src/storage/mod.rs

pub mod key_state;
pub mod pool;

pub use key_state::{preview_key, KeyHealth, KeyRecord, KeyStatus};
pub use pool::{KeyLease, KeyPool, Outcome, RotationPolicy, ServiceStatus};
