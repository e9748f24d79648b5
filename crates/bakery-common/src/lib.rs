//! # bakery-common
//!
//! Shared error definitions, loader options, constants, and the bake
//! configuration model (`Config`, `Group`, `Target`) used across the
//! Bakery workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
