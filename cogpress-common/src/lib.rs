//! # Cogpress Common Library
//!
//! Shared code for the cogpress services:
//! - Error types
//! - Configuration loading and resolution
//! - Encoding profile definitions

pub mod config;
pub mod error;

pub use config::{EncodingProfile, ServiceConfig};
pub use error::{Error, Result};
