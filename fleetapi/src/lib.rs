//! Real-time vehicle telemetry pipeline.
//!
//! Samples arrive over HTTP (or from the synthetic generator), go through
//! [`service::IngestionService`], which persists them, moves the vehicle's
//! live snapshot and judges route deviation, and are then fanned out to the
//! owning tenant's live channel.

pub mod api;
pub mod core;
pub mod domain;
pub mod geo;
pub mod service;
pub mod store;
pub mod stream;
