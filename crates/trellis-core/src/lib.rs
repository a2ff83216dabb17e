//! Trellis Core Library
//!
//! Shared functionality for Trellis components:
//! - Typed garden records and connection form models
//! - Record/form transcoding and entry-point emptiness rules
//! - Connection-parameter validation and sanitising
//! - Real-time event fan-out registry
//! - Configuration resolution and common error types

pub mod config;
pub mod error;
pub mod events;
pub mod feedback;
pub mod model;
pub mod panel;
pub mod sanitize;
pub mod tracing_init;
pub mod transcode;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{ConnectionParams, ConnectionType, GardenForm, GardenRecord};
pub use panel::GardenPanel;
pub use transcode::{TranscodeError, form_to_server, server_to_form};
