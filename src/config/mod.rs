//! Configuration module.
//!
//! This module provides the probe settings and functionality for loading
//! them (and request batches) from various sources.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::Settings;
