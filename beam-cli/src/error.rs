use arkbeam::BeamError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Couldn't load configuration: {0}")]
    ConfigError(String),

    #[error("Invalid resolution '{0}', expected WIDTHxHEIGHT")]
    InvalidResolution(String),

    #[error("Capacity of {0} bytes is more than one QR symbol holds ({1} bytes)")]
    InvalidCapacity(usize, usize),

    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    #[error("Background task failed: {0}")]
    TaskError(String),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    BeamError(#[from] BeamError),
}
