//! Cache Probe Core - Shared domain records.
//!
//! This crate provides the records exchanged between the probe components:
//! - `server` - The origin GraphQL server holding mock data
//! - `client` - The normalized query cache and its GraphQL transport
//! - `cli` - The demo shell that drives scenarios against a running server
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP, no GraphQL runtime.
//! This keeps it lightweight and allows it to be used on both sides of the wire.
//!
//! # Modules
//!
//! - [`types`] - Typed ids plus the `Product` and `User` records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
