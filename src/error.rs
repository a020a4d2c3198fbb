//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Unified error hierarchy for the block-stream cipher core.

use thiserror::Error;

/// Top-level error type returned by every public entry point in this crate.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("primitive operation failed")]
    Primitive(#[from] PrimitiveError),

    #[error("handshake failed")]
    Handshake(#[from] HandshakeError),

    #[error("header codec failed")]
    Header(#[from] HeaderError),

    #[error("block-stream codec failed")]
    BlockStream(#[from] BlockStreamError),

    #[error("hide/reveal layer failed")]
    Hide(#[from] HideError),

    #[error("key store failed")]
    KeyStore(#[from] KeyStoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the primitives façade (§4.1).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("tag verification failed")]
    TagMismatch,

    #[error("requested hash output length {0} is outside [1, 64]")]
    HashLenOutOfRange(usize),

    #[error("elligator2 encoding does not exist for this public key (resample)")]
    ElligatorEncodeFailed,

    #[error("elligator2 representative does not decode to a valid point")]
    ElligatorDecodeFailed,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("block counter would reach 2^63 - 1")]
    NonceSpaceExhausted,
}

/// Errors from the Noise-pattern handshake core (§4.2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("token {0} requires a key that was never set")]
    PatternMisuse(&'static str),

    #[error("handshake authentication failed")]
    Auth,

    #[error("handshake already finished, no more tokens to process")]
    AlreadyFinished,

    #[error("unknown handshake pattern name: {0}")]
    UnknownPattern(String),
}

/// Errors from the header codec (§4.3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("no KDF cost from 0..={0} authenticated the password header")]
    PasswordOrCorrupt(u8),

    #[error("no recipient branch decrypted for this key")]
    NotARecipient,

    #[error("header handshake failed")]
    Handshake(#[from] HandshakeError),

    #[error("too many recipients: {0} > 255")]
    TooManyRecipients(usize),

    #[error("header parameters out of range: {0}")]
    ParamOutOfRange(String),

    #[error("header is incomplete or truncated")]
    Truncated,
}

/// Errors from the block-stream codec (§4.4).
#[derive(Error, Debug)]
pub enum BlockStreamError {
    #[error("block parameters out of range: {0}")]
    ParamOutOfRange(String),

    #[error("a block tag failed to verify")]
    BodyAuth,

    #[error("stream ended before a full or valid terminal block was read")]
    StreamTruncated,

    #[error("block counter would reach 2^63 - 1")]
    NonceSpaceExhausted,

    #[error("operation attempted on a stream already closed")]
    AlreadyClosed,

    #[error("decoder is not restartable after a prior fatal error")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the hide/reveal layer (§4.5).
#[derive(Error, Debug)]
pub enum HideError {
    #[error("outer layer authentication failed")]
    OuterAuth,

    #[error("inner layer has no valid secret for the given password/key")]
    InnerPasswordOrNoSecret,

    #[error("filler region too small to carry an inner layer: need > 24 bytes, got {0}")]
    FillerTooSmall(usize),

    #[error("outer block-stream codec failed")]
    Outer(#[from] BlockStreamError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the identity/key store (§4.6).
#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("self-signature verification failed, key rejected")]
    KeyInvalid,

    #[error("record is truncated or malformed")]
    RecordMalformed,

    #[error("no key matched the given selector")]
    NoMatch,

    #[error("selector matched more than one key ambiguously")]
    AmbiguousMatch,

    #[error("encrypted ring stream failed")]
    Stream(#[from] BlockStreamError),

    #[error("ring password header failed")]
    Header(#[from] HeaderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
