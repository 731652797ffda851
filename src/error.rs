//! Error types for the relay server

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Errors raised at the device/account API boundary
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Live call request failed: {0}")]
    CallFailed(String),

    #[error("Speaker activation failed: {0}")]
    SpeakerUnavailable(String),

    #[error("Audio send failed: {0}")]
    SendFailed(String),

    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),

    #[error("Call already ended")]
    CallEnded,
}

/// Relay lifecycle errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("HLS playlist not created within {0} ms - streaming may have failed")]
    ReadinessTimeout(u64),

    #[error("Stream start failed: {0}")]
    StartFailed(#[from] DeviceError),

    #[error("Stream start cancelled")]
    Cancelled,

    #[error("Artifact directory unavailable: {0}")]
    OutputDir(std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
