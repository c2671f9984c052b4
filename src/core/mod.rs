// src/core/mod.rs

pub mod key_rotation;

pub use key_rotation::{KeyRotationStrategy, RoundRobinStrategy};
