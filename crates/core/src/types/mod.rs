//! Core types for Cache Probe.
//!
//! This module provides type-safe wrappers for the probe's domain records.

pub mod id;
pub mod product;
pub mod user;

pub use id::*;
pub use product::{Product, ProductInput};
pub use user::User;
