//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! The raw keystream primitive every other module builds on.
//!
//! This is the "legacy" (pre-IETF, djb-original) ChaCha20 layout: an 8-byte
//! nonce and an 8-byte little-endian block counter, rather than the IETF
//! 12-byte-nonce/32-bit-counter layout `chacha20poly1305` bundles. The block
//! counter doubles as this crate's block-stream counter, so callers address
//! keystream directly by `(key, nonce64, block_number)` instead of by a byte
//! offset.

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20Legacy;

/// Bytes of keystream produced by one ChaCha20 block.
pub const BLOCK_BYTES: u64 = 64;

/// XOR `input` with the ChaCha20 keystream of `(key, nonce64)` starting at
/// `block_counter`, writing the result into `out`.
///
/// Block counter `0` of a given `(key, nonce64)` pair is reserved — callers
/// in [`super::aead`] use it to derive a one-time MAC key and must never
/// also use it to encrypt application data; ciphertext in this crate always
/// starts at `block_counter = 1`.
///
/// # Panics
///
/// Panics if `out.len() != input.len()`.
pub fn stream_xor(out: &mut [u8], input: &[u8], key: &[u8; 32], nonce64: u64, block_counter: u64) {
    assert_eq!(out.len(), input.len(), "stream_xor: length mismatch");
    let nonce_bytes = nonce64.to_le_bytes();
    let mut cipher = ChaCha20Legacy::new(key.into(), (&nonce_bytes).into());
    cipher
        .try_seek(block_counter * BLOCK_BYTES)
        .expect("block counter within ChaCha20Legacy's 64-bit keystream space");
    out.copy_from_slice(input);
    cipher.apply_keystream(out);
}

/// Produce exactly one 64-byte keystream block for `(key, nonce64,
/// block_counter)`. Used by [`super::aead`] to derive per-recipient MAC
/// keys from the first 32 bytes of `stream(key_auth, nonce64, 0)`.
pub fn keystream_block(key: &[u8; 32], nonce64: u64, block_counter: u64) -> [u8; 64] {
    let zeros = [0u8; 64];
    let mut out = [0u8; 64];
    stream_xor(&mut out, &zeros, key, nonce64, block_counter);
    out
}
