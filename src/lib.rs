//! Larder - content-addressed dedup store and git publishing pipeline.
//!
//! This crate provides the core functionality for the `larder` CLI tool.
//!
//! # Architecture
//!
//! - [`store`] - SHA-256 content store with a SQLite hash index
//! - [`repo`] - git working-tree management behind the [`repo::Git`] trait
//! - [`sync`] - output discovery, contained copies, store mirroring
//! - [`export`] - ratcheted SQL dumps, SQLite export, repository metadata
//! - [`publish`] - the publish cycle and its run loop
//! - [`collab`] - job queue and database collaborators
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod collab;
pub mod config;
pub mod error;
pub mod export;
pub mod publish;
pub mod repo;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
