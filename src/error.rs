//! Error types for NowLink
//!
//! This module defines all error types used by the node-side link and the
//! shared record codec.

use thiserror::Error;

/// Result type alias for NowLink operations
pub type Result<T> = std::result::Result<T, NowlinkError>;

/// Main error type for NowLink operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NowlinkError {
    /// Record codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Radio driver error
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// Channel cache storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Send-with-ack error
    #[error("Send error: {0}")]
    Send(#[from] SendError),
}

/// Errors while encoding or decoding a telemetry record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload is not exactly one record long
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Errors reported by the radio driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// The unicast transmit call itself failed
    #[error("Transmit failed with code {0}")]
    TransmitFailed(u8),

    /// Radio refused to register a peer
    #[error("Peer {address} rejected on channel {channel}")]
    PeerRejected { address: String, channel: u8 },

    /// Peer is not registered
    #[error("Peer not registered")]
    PeerNotFound,

    /// Radio refused the channel
    #[error("Channel {0} rejected by radio")]
    ChannelRejected(u8),

    /// Radio has not been initialized
    #[error("Radio not initialized")]
    NotInitialized,
}

/// Errors related to the persisted channel cache
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Read-back after write did not match
    #[error("Write verification failed")]
    VerifyFailed,

    /// Value out of the valid channel range
    #[error("Invalid channel: {0}")]
    InvalidChannel(u8),
}

/// Why a single delivery attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    /// No delivery report arrived before the ack timeout
    #[error("no acknowledgment within timeout")]
    Timeout,

    /// Transport reported a failed delivery
    #[error("delivery failed with status {0}")]
    Nack(u8),

    /// The transmit call was rejected by the radio
    #[error("{0}")]
    Radio(RadioError),
}

/// Errors from the send-with-acknowledgment protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Retry budget used up without a successful delivery
    #[error("Delivery failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u8, last: SendFailure },

    /// Unacknowledged send whose transmit call failed
    #[error("Not transmitted: {0}")]
    NotTransmitted(RadioError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NowlinkError::Send(SendError::Exhausted {
            attempts: 2,
            last: SendFailure::Nack(1),
        });
        let msg = format!("{}", err);
        assert!(msg.contains("2 attempts"));
        assert!(msg.contains("status 1"));
    }

    #[test]
    fn test_error_conversion() {
        let codec_err = CodecError::LengthMismatch {
            expected: 84,
            actual: 10,
        };
        let err: NowlinkError = codec_err.into();
        assert!(matches!(err, NowlinkError::Codec(_)));
    }
}
