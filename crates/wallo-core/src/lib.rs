//! # wallo core
//!
//! Runtime-free logic shared by the wallo assistant: data models, the
//! error taxonomy, chunking, vector ranking, prompt assembly, and the
//! [`Backend`](service::Backend) trait that service clients implement.
//!
//! This crate performs no network or filesystem I/O and does not depend on
//! tokio.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod prompt;
pub mod service;

pub use error::{Error, Result};
