//! nbgrade-portal: Grading portal integration.
//!
//! Loads nbgrade configuration, talks to the portal's checksum and grading
//! endpoints, and publishes pipeline status through the `ResultReporter`
//! trait.

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod reporter;

pub use client::{PortalClient, Target};
pub use config::{load_config, load_config_from, GradingConfig, NbgradeConfig, PortalConfig};
pub use error::TransportError;
pub use mock::RecordingReporter;
pub use reporter::PortalReporter;
