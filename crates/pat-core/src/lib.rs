//! # pat-core
//!
//! Core types, the market data seam, configuration, and error handling
//! shared by the PAT signal and analyzer crates.

pub mod config;
pub mod error;
pub mod market;
pub mod traits;

pub use error::PatError;
