//! # rollcall-server
//!
//! HTTP bridge library for the rollcall attendance system.
//!
//! This library provides the API handlers, the platform adapters fed by the
//! native shell, and the club backend client.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod bridge;
pub mod logging;
pub mod reporter;
pub mod state;
pub mod upstream;
