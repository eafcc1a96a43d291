//! Supply-rail aware millivolt conversion for 10-bit ADCs.
//!
//! A reference voltage of about 1.1 V is sampled against the unregulated
//! supply rail. The resulting code (the reference factor) together with the
//! known reference voltage turns any ADC reading into millivolts, and reading
//! the rail itself back gives the current supply voltage.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod reference;
pub mod sampler;
pub mod store;
#[cfg(feature = "nrf")]
pub mod voltage;

pub use reference::ReferenceCalibrator;
pub use sampler::{AsyncReferenceSampler, ReferenceSampler, Settled};
pub use store::OffsetStore;
