//! Core types and reconciliation routines for the Lencana badge registry.
//!
//! This crate has no HTTP or file-format dependencies.
//! Every view it produces is derived from a [`snapshot::Snapshot`] fetched
//! in full from the backend; nothing here is persisted.

pub mod access;
pub mod badge;
pub mod cohort;
pub mod error;
pub mod gate;
pub mod normalize;
pub mod promotion;
pub mod record;
pub mod registration;
pub mod role;
pub mod school;
pub mod snapshot;


pub use error::{Error, Result};
