//! Test utilities for the piggy crates.
//!
//! This crate provides seeded synthetic document generation, both as in-memory
//! [`piggy_index::Document`] values and as `ndjson` files for the command line tool.

pub mod data_gen;
