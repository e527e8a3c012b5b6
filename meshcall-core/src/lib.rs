//! Shared configuration and logging for meshcall

pub mod bootstrap;
pub mod config;
pub mod logging;

pub use config::{
    CameraConfig, ConferenceConfig, Config, EncoderConfig, LoggingConfig, TransportConfig,
    ViewportConfig,
};
