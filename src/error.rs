//! # Ingest Error Taxonomy
//!
//! Errors are split per component boundary rather than collapsed into one
//! flat enum, the same way the base crate distinguishes `MBusError` from
//! `CryptoError` and `WMBusError`. [`IngestError`] composes them for call
//! sites (the worker loop, the binary entry point) that must handle more
//! than one component's failures at once.

use thiserror::Error;

use crate::codec::CodecError;
use crate::mqtt::TransportError;
use crate::store::StoreError;

/// Failure to flush a [`crate::group_buffer::MessageGroup`] to the Notifier.
#[derive(Error, Debug)]
pub enum GroupBufferError {
    #[error("notifier rejected group {id}: {reason}")]
    NotifyFailed { id: u32, reason: String },
}

/// Top-level error uniting every component's failure kind.
///
/// Workers classify and log at their own boundary (§7 of the spec); this
/// type exists only for call sites that need one `Result` across multiple
/// components, such as the binary entry point's `main`.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    GroupBuffer(#[from] GroupBufferError),

    #[error("fatal: {0}")]
    Fatal(String),
}
