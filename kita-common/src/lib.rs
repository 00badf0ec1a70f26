//! # Kita Common Library
//!
//! Shared code for the Kita services including:
//! - Error types
//! - Event types (KitaEvent enum) and the EventBus
//! - Configuration loading and root folder resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
