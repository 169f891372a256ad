//! Conneg - HTTP content negotiation with a backpressured connector core
//!
//! Picks the best representation of a resource from client preferences
//! and serves static directories through a bounded worker pool.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod connector;
pub mod directory;
pub mod error;
pub mod metadata;
pub mod negotiation;
pub mod server;

pub use error::{ConnegError, Result};
