//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! # Layer 3: Header codec
//!
//! Writes and reads the two envelope kinds a [`crate::blockstream::BlockStream`]
//! can be opened from: a [`password`] header (salt + scrypt-derived key) and a
//! [`public`] header (one Noise-`X` branch per recipient, plus the `public::spoof`
//! deniable variant). Both produce the same [`OpenedHeader`] shape — a transport
//! key, the base nonce the block-stream body starts counting from, and the
//! block-shape parameters — so `blockstream` never has to know which kind of
//! header unlocked a given stream.
//!
//! ## Layer Contract
//!
//! **CAN import:** `primitives`, `handshake` (the public header's branch codec
//! is hand-rolled directly atop [`crate::handshake::SymmetricState`], not the
//! generic [`crate::handshake::HandshakeState`] pattern engine — see
//! `public`'s module doc for why), `error`, `secret`.
//! **NEVER imports:** `blockstream`, `hide`, `keystore`, `io` — those consume
//! this module's output, not the other way around.

pub mod password;
pub mod public;

pub use password::{read_password_header, write_password_header};
pub use public::{read_public_header, write_public_header, write_spoof_header};

use crate::error::HeaderError;
use crate::primitives::rng::KeyedRng;

/// Largest block size this crate will accept, per the data model's
/// `bs ≤ 10,000,000` invariant.
pub const MAX_BLOCK_SIZE: u32 = 10_000_000;

/// Everything a successfully-opened header hands to the block-stream codec:
/// the transport key, the nonce the body's block 0 starts counting from, the
/// block shape, and the auxiliary key(s) the body's per-block MACs are
/// computed under. Produced by both [`password::read_password_header`] and
/// [`public::read_public_header`] (and their `write_*` counterparts, for the
/// writer's own immediate use).
///
/// A writer's `keys_auth` holds every recipient's auxiliary key (`len() ==
/// n_recipients`, matching the original's `set_adw(&kv[0], rx.size())`); a
/// reader only ever learns its own, so `keys_auth` there is a single-element
/// vector and `tag_index`/`n_recipients` locate and size the full tag list on
/// disk. Password streams are the N=1 case of the same shape: `keys_auth ==
/// [key]`, `n_recipients == 1`, `tag_index == 0`.
#[derive(Clone)]
pub struct OpenedHeader {
    pub key: [u8; 32],
    pub base_nonce: u64,
    pub bs: u32,
    pub bf: u32,
    pub keys_auth: Vec<[u8; 32]>,
    pub n_recipients: usize,
    pub tag_index: usize,
}

/// Resolve `bs`/`bf`, filling in either with the keyed RNG when the caller
/// passes `None` ("unspecified"): `bs` uniform in `[4096, 8192)`, `bf`
/// uniform in `[0, 2·bs/3)`. Both headers share this so a password stream
/// and a public stream pick shapes from the identical distribution.
pub fn adjust_bs_bf(
    bs: Option<u32>,
    bf: Option<u32>,
    rng: &mut KeyedRng,
) -> Result<(u32, u32), HeaderError> {
    let bs = match bs {
        Some(v) => v,
        None => {
            let mut buf = [0u8; 4];
            rng.fill(&mut buf);
            4096 + (u32::from_le_bytes(buf) % 4096)
        }
    };
    let bf = match bf {
        Some(v) => v,
        None => {
            let mut buf = [0u8; 4];
            rng.fill(&mut buf);
            let frac = u32::from_le_bytes(buf) as u64;
            (((bs as u64) * 2 / 3 * frac) / (1u64 << 32)) as u32
        }
    };
    validate_bs_bf(bs, bf)?;
    Ok((bs, bf))
}

/// The invariants every header's parameter block must satisfy, regardless
/// of whether `bs`/`bf` were caller-supplied or randomly chosen.
pub fn validate_bs_bf(bs: u32, bf: u32) -> Result<(), HeaderError> {
    if bs == 0 || bs > MAX_BLOCK_SIZE {
        return Err(HeaderError::ParamOutOfRange(format!(
            "block size {bs} out of range (1..={MAX_BLOCK_SIZE})"
        )));
    }
    if bf >= bs {
        return Err(HeaderError::ParamOutOfRange(format!(
            "block filler {bf} must be less than block size {bs}"
        )));
    }
    Ok(())
}

pub(crate) fn read_exact_or<R: std::io::Read>(
    source: &mut R,
    buf: &mut [u8],
    err: HeaderError,
) -> Result<(), HeaderError> {
    source.read_exact(buf).map_err(|_| err)
}
