//! shorter - short-key URL storage core
//!
//! Maps long URLs to short keys derived by a weighted checksum, persists the
//! mapping under one of several interchangeable backends and applies bulk,
//! ownership-scoped soft-deletion asynchronously.
//!
//! # Architecture
//! - `utils`: key derivation and URL normalization
//! - `storage`: the `StorageEngine` trait and its memory, file and SQL backends
//! - `deletion`: bounded queue plus background consumer for soft-deletes
//! - `config`: configuration loading (TOML + environment)
//! - `system`: logging setup
//! - `cli` / `interfaces`: command-line entry points

pub mod cli;
pub mod config;
pub mod deletion;
pub mod errors;
pub mod interfaces;
pub mod storage;
pub mod system;
pub mod utils;
