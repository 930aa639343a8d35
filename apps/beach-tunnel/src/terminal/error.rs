use crate::config::ConfigError;
use crate::session::SessionError;
use crate::telemetry::logging::InitError;
use crate::transport::TransportError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("connection failed: {0}")]
    Connect(#[source] TransportError),
    #[error("prompt handshake failed: {0}")]
    Handshake(#[source] SessionError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("logging initialization failed: {0}")]
    Logging(#[from] InitError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
