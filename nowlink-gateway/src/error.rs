// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for NowLink Gateway

use thiserror::Error;

/// Errors reported by a broker session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// No live session
    #[error("Not connected to broker")]
    NotConnected,

    /// Session could not be established
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Broker or client refused the publish
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },
}

/// Main error type for Gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Broker error
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the link layer
    #[error("Link error: {0}")]
    Link(#[from] nowlink::NowlinkError),
}

/// Result type alias for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
