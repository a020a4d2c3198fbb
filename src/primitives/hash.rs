//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! A single parametric hash interface with output length in `[1, 64]`,
//! satisfied by BLAKE2s for short outputs and BLAKE2b for long ones.
//!
//! The handshake's protocol-name string is literally
//! `"Noise_<pattern>_25519_ChaChaPoly_BLAKE2s"`, so the 32-byte transcript
//! hash and chaining-key operations always go through BLAKE2s. The key
//! store's 64-byte signature pre-hash needs more than BLAKE2s natively
//! produces, so it goes through BLAKE2b instead. Both accept an optional
//! key, which is how this one function serves both the unkeyed transcript
//! hash and keyed derivations elsewhere in the crate.

use blake2::digest::{Update, VariableOutput};
use blake2::{Blake2bVar, Blake2sVar};

use crate::error::PrimitiveError;

/// Maximum output length this function will produce.
pub const MAX_OUT_LEN: usize = 64;

/// Hash `data` (concatenation of all slices in `parts`) to `out_len` bytes,
/// optionally keyed. `out_len` must be in `1..=64`; `out_len <= 32` uses
/// BLAKE2s, larger uses BLAKE2b.
pub fn hash_long(out_len: usize, key: Option<&[u8]>, parts: &[&[u8]]) -> Result<Vec<u8>, PrimitiveError> {
    if out_len == 0 || out_len > MAX_OUT_LEN {
        return Err(PrimitiveError::HashLenOutOfRange(out_len));
    }
    let mut out = vec![0u8; out_len];
    if out_len <= 32 {
        let mut hasher = match key {
            Some(k) => Blake2sVar::new_with_params(&[], k, &[], out_len)
                .map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?,
            None => Blake2sVar::new(out_len).map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?,
        };
        for part in parts {
            Update::update(&mut hasher, part);
        }
        hasher
            .finalize_variable(&mut out)
            .map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?;
    } else {
        let mut hasher = match key {
            Some(k) => Blake2bVar::new_with_params(&[], k, &[], out_len)
                .map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?,
            None => Blake2bVar::new(out_len).map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?,
        };
        for part in parts {
            Update::update(&mut hasher, part);
        }
        hasher
            .finalize_variable(&mut out)
            .map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?;
    }
    Ok(out)
}

/// Convenience for the common 32-byte unkeyed case (the Noise transcript
/// hash `H(h ‖ data)`).
pub fn hash32(parts: &[&[u8]]) -> [u8; 32] {
    let v = hash_long(32, None, parts).expect("out_len=32 is always in range");
    let mut out = [0u8; 32];
    out.copy_from_slice(&v);
    out
}

/// Convenience for the key store's 64-byte canonical-hash-for-signing case.
pub fn hash64(parts: &[&[u8]]) -> [u8; 64] {
    let v = hash_long(64, None, parts).expect("out_len=64 is always in range");
    let mut out = [0u8; 64];
    out.copy_from_slice(&v);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_length() {
        assert!(hash_long(0, None, &[b"x"]).is_err());
        assert!(hash_long(65, None, &[b"x"]).is_err());
    }

    #[test]
    fn deterministic() {
        let a = hash_long(32, None, &[b"same", b"input"]).unwrap();
        let b = hash_long(32, None, &[b"same", b"input"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn keyed_differs_from_unkeyed() {
        let a = hash_long(32, None, &[b"data"]).unwrap();
        let b = hash_long(32, Some(b"key"), &[b"data"]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn crosses_32_byte_boundary_via_different_algorithms() {
        let short = hash_long(32, None, &[b"boundary"]).unwrap();
        let long = hash_long(40, None, &[b"boundary"]).unwrap();
        assert_eq!(short.len(), 32);
        assert_eq!(long.len(), 40);
        assert_ne!(&long[..32], &short[..]);
    }
}
