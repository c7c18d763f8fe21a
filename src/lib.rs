//! Reconciles refreshed feed entries against the entry store.
//!
//! Each [`models::Batch`] carries one feed's refresh result. The
//! [`reconcile::Reconciler`] classifies every item as new, an update, a
//! re-delivery or a cross-posted alternate, and notifies subscribers when an
//! update adds a significant amount of text.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod services;

pub use error::{AppError, Result};
