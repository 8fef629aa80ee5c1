//! # Codec
//!
//! Envelope validation, protobuf decoding, and AES-CTR decryption (§4.2).
//!
//! ```text
//! raw MQTT payload -> validate_envelope -> decode_service_envelope
//!                                        -> (try_decrypt if `encrypted`)
//!                                        -> decode_data -> PortPayload
//! ```

pub mod crypto;
pub mod envelope;
pub mod json;
pub mod payload;
pub mod wire;

pub use envelope::{MeshPacket, PacketPayload, ServiceEnvelope};
pub use json::decode_json_envelope;
pub use payload::{Data, PortPayload};

use thiserror::Error;

/// Error texts that are suppressed from logging per §4.2's suppression
/// list — noisy, expected-in-the-wild decode failures that would otherwise
/// flood the logs.
pub const SUPPRESSED_ERROR_SUBSTRINGS: &[&str] = &[
    "illegal tag",
    "index out of range",
    "invalid wire type",
    "Error received for packet",
    "NO_",
    "TIMEOUT",
    "TOO_LARGE",
    "NOT_AUTHORIZED",
];

/// Returns true if `message` should be suppressed from logging per §4.2.
pub fn is_suppressed(message: &str) -> bool {
    SUPPRESSED_ERROR_SUBSTRINGS
        .iter()
        .any(|needle| message.contains(needle))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet too small: {0} bytes")]
    TooSmall(usize),

    #[error("packet too large: {0} bytes")]
    TooLarge(usize),

    #[error("first byte is not a length-delimited field 1 tag")]
    BadEnvelopeTag,

    #[error("announced length-delimited size exceeds remaining buffer")]
    LengthOverrun,

    #[error("protobuf decode failed: {0}")]
    Malformed(String),

    #[error("packet carries neither decoded nor encrypted payload")]
    MissingPayload,

    #[error("packet carries both decoded and encrypted payload")]
    AmbiguousPayload,

    #[error("no configured key decrypted this packet")]
    NoKeyMatched,
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for CodecError {
    fn from(err: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        CodecError::Malformed(err.to_string())
    }
}
