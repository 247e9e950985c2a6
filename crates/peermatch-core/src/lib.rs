//! Core types and matching logic for the peer-matching queue.
//!
//! This crate is deliberately free of HTTP and storage-backend dependencies.
//! All other crates depend on it; it depends on nothing proprietary.
//!
//! The matchers ([`matcher`], [`fallback`]) and the duplicate detector
//! ([`dedupe`]) are pure functions of a loaded snapshot. The [`engine`]
//! wraps them in load / compute / conditional-save transactions against any
//! [`store::QueueStore`], retrying a bounded number of times on write
//! conflicts.

pub mod dedupe;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod matcher;
pub mod notify;
pub mod record;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
