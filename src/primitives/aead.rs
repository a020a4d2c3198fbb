//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Multi-recipient AEAD: one ChaCha20 ciphertext, one independent Poly1305
//! tag per auxiliary key.
//!
//! This is not `chacha20poly1305` (that crate commits to exactly one MAC
//! key per message). Every recipient of a block-stream or header needs to
//! verify the *same* ciphertext under their *own* key, so the tag
//! construction here is the single-key IETF ChaCha20-Poly1305 padding
//! convention run once per auxiliary key.

use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;
use subtle::ConstantTimeEq;

use super::stream::{keystream_block, stream_xor};
use crate::error::PrimitiveError;

/// Derive the one-time Poly1305 key for auxiliary key `key_auth` under this
/// block's nonce: the first 32 bytes of `stream(key_auth, nonce64, 0)`.
fn derive_mac_key(key_auth: &[u8; 32], nonce64: u64) -> [u8; 32] {
    let block = keystream_block(key_auth, nonce64, 0);
    let mut mac_key = [0u8; 32];
    mac_key.copy_from_slice(&block[..32]);
    mac_key
}

/// Compute one tag over `ad ‖ pad16(ad) ‖ ct ‖ pad16(ct) ‖ u64_le(|ad|) ‖
/// u64_le(|ct|)`, keyed by `mac_key`.
fn poly1305_tag(mac_key: &[u8; 32], ad: &[u8], ct: &[u8]) -> [u8; 16] {
    let mut mac = Poly1305::new(mac_key.into());
    mac.update_padded(ad);
    mac.update_padded(ct);
    let mut lengths = [0u8; 16];
    lengths[0..8].copy_from_slice(&(ad.len() as u64).to_le_bytes());
    lengths[8..16].copy_from_slice(&(ct.len() as u64).to_le_bytes());
    mac.update_padded(&lengths);
    mac.finalize().into_bytes().into()
}

/// Encrypt `plaintext` under `(key_enc, nonce64, block_counter = 1)` and
/// produce one 16-byte tag per entry of `keys_auth`, each binding `ad` and
/// the ciphertext. Returns `(ciphertext, tags)` with `tags.len() ==
/// keys_auth.len()`.
pub fn aead_seal_multi(
    plaintext: &[u8],
    ad: &[u8],
    key_enc: &[u8; 32],
    keys_auth: &[[u8; 32]],
    nonce64: u64,
) -> (Vec<u8>, Vec<[u8; 16]>) {
    let mut ct = vec![0u8; plaintext.len()];
    stream_xor(&mut ct, plaintext, key_enc, nonce64, 1);
    let tags = keys_auth
        .iter()
        .map(|key_auth| {
            let mac_key = derive_mac_key(key_auth, nonce64);
            poly1305_tag(&mac_key, ad, &ct)
        })
        .collect();
    (ct, tags)
}

/// Verify the tag at `auth_index` under `key_auth`, then decrypt. Only that
/// one recipient's tag is checked — the others are opaque to a caller who
/// does not hold their keys.
pub fn aead_open_multi(
    ciphertext: &[u8],
    ad: &[u8],
    key_enc: &[u8; 32],
    key_auth: &[u8; 32],
    tag_at_index: &[u8; 16],
    nonce64: u64,
) -> Result<Vec<u8>, PrimitiveError> {
    let mac_key = derive_mac_key(key_auth, nonce64);
    let expected = poly1305_tag(&mac_key, ad, ciphertext);
    if expected.ct_eq(tag_at_index).unwrap_u8() != 1 {
        return Err(PrimitiveError::TagMismatch);
    }
    let mut pt = vec![0u8; ciphertext.len()];
    stream_xor(&mut pt, ciphertext, key_enc, nonce64, 1);
    Ok(pt)
}

/// Single-recipient convenience wrapper over [`aead_seal_multi`], used
/// wherever the spec calls for one key doing double duty as both the
/// encryption and the sole authentication key (e.g. the password header's
/// parameter block).
pub fn aead_seal(plaintext: &[u8], key: &[u8; 32], nonce64: u64) -> Vec<u8> {
    let (mut ct, mut tags) = aead_seal_multi(plaintext, &[], key, std::slice::from_ref(key), nonce64);
    ct.extend_from_slice(&tags.remove(0));
    ct
}

/// Single-recipient convenience wrapper over [`aead_open_multi`]. `sealed`
/// is ciphertext with its 16-byte tag appended, as produced by
/// [`aead_seal`].
pub fn aead_open(sealed: &[u8], key: &[u8; 32], nonce64: u64) -> Result<Vec<u8>, PrimitiveError> {
    if sealed.len() < 16 {
        return Err(PrimitiveError::TagMismatch);
    }
    let (ct, tag) = sealed.split_at(sealed.len() - 16);
    let mut tag_arr = [0u8; 16];
    tag_arr.copy_from_slice(tag);
    aead_open_multi(ct, &[], key, key, &tag_arr, nonce64)
}
