//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

#![cfg_attr(docsrs, feature(doc_cfg))]

//! # veilstream-core
//!
//! A file-level authenticated block-stream cipher: confidentiality and
//! integrity for data at rest, with truncation detection, multi-recipient
//! envelopes, traffic-analysis padding, and an optional steganographic
//! hide/reveal layer — all without a dependency on any particular transport
//! or storage medium.
//!
//! ## Key Properties
//!
//! - **Authenticated block stream**: plaintext is split into fixed-size
//!   blocks, each sealed under a per-block nonce with one MAC per
//!   recipient, so truncation or reordering is detectable rather than
//!   silently accepted.
//! - **Two header kinds**: a password header (salt + scrypt-derived key)
//!   and a public-key header built from Noise `X`-pattern branches, one per
//!   recipient, including a deniable/spoofable variant.
//! - **Traffic-analysis resistance**: per-block filler bytes and an
//!   Elligator2 encoding for ephemeral public keys so handshake messages
//!   don't look like curve points on the wire.
//! - **Hide/reveal layer**: a second, independently-keyed stream can be
//!   layered into an outer stream's filler bytes.
//! - **Identity/key store**: self-signed identity records with a
//!   certification graph, selectable by prefix or substring.
//!
//! ## Architecture
//!
//! Each module only imports the layers beneath it — see each module's own
//! "Layer Contract" doc section for the exact rule:
//!
//! - [`primitives`] — raw cryptographic building blocks (stream cipher,
//!   AEAD, hashing, KDF, Diffie-Hellman, Elligator2 encoding, keyed RNG).
//! - [`handshake`] — the Noise Protocol Framework core: symmetric state and
//!   the generic pattern-driven handshake state machine.
//! - [`header`] — password and public-key header codecs built on
//!   `handshake` and `primitives`.
//! - [`blockstream`] — the authenticated, seekable block-stream codec.
//! - [`hide`] — steganographic layering on top of `blockstream`.
//! - [`keystore`] — identity records and key rings, themselves stored in an
//!   encrypted `blockstream`.
//! - [`secret`] — the `Secret<T>` zeroizing wrapper used throughout.
//! - [`io`] — the `Read + Write + Seek` trait boundary callers implement.
//! - [`error`] — the unified error hierarchy, one enum per module above.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//! use veilstream_core::header::write_password_header;
//! use veilstream_core::blockstream::BlockStream;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut file = Vec::new();
//! let header = write_password_header(&mut file, b"correct horse battery staple", None, None, 14)?;
//! let mut stream = BlockStream::create(Cursor::new(file), &header, 0);
//! stream.write(b"secret message")?;
//! stream.close()?;
//! # Ok(())
//! # }
//! ```

pub mod blockstream;
pub mod error;
pub mod handshake;
pub mod header;
pub mod hide;
pub mod io;
pub mod keystore;
pub mod primitives;
pub mod secret;

pub use blockstream::BlockStream;
pub use error::{
    BlockStreamError, CoreError, HandshakeError, HeaderError, HideError, KeyStoreError,
    PrimitiveError,
};
pub use handshake::{HandshakeConfig, HandshakeState};
pub use header::{read_password_header, read_public_header, write_password_header, OpenedHeader};
pub use hide::{reveal, write_hidden};
pub use io::{BlockSink, BlockSource};
pub use keystore::{KeyRing, RecordSink, RecordSource, Selector};
pub use secret::Secret;
