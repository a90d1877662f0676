//! Client for the Lencana backend script.
//!
//! Wraps the backend's single-URL JSON API ([`ApiClient`]), keeps the
//! local session and caches in a shared [`StateStore`], and runs the
//! sequential bulk operations on top of `lencana-core`'s planning and
//! pre-flight checks.

pub mod action;
pub mod bulk;
pub mod client;
pub mod error;
pub mod state;
pub mod throttle;

pub use action::Action;
pub use bulk::GroupOutcome;
pub use client::{ApiClient, ClientConfig};
pub use error::{Error, Result};
pub use state::{LocalState, StateStore};
pub use throttle::LoginThrottle;

#[cfg(test)]
mod tests;
