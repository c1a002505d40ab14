//! Shared types for the sensor crate.

pub mod error;

pub use error::*;
