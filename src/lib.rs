//! Try-on job gateway - brokers virtual try-on image synthesis requests.
//!
//! Dispatches jobs to an external image-generation provider, tracks their
//! lifecycle, meters consumption against prepaid per-tenant credits, and
//! persists provider results through an ordered multi-backend storage
//! gateway.

pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod models;
pub mod provider;
pub mod repo;
pub mod storage;

pub use error::{Error, Result};
