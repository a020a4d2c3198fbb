//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! The `(ck, k, h)` chaining-key / cipher-key / transcript-hash triple
//! shared by every Noise pattern, and the HMAC-BLAKE2s chain Noise calls
//! `HKDF` (distinct from, though related to, the `hkdf` crate's one-shot
//! extract-then-expand API — Noise's construction chains HMAC calls with
//! single-byte counters, so it's implemented directly here with `hmac`).

use blake2::Blake2s256;
use hmac::{Hmac, Mac};

use crate::error::HandshakeError;
use crate::primitives::hash::hash32;
use crate::primitives::{aead_open_multi, aead_seal_multi};

type HmacBlake2s = Hmac<Blake2s256>;

fn hmac_blake2s(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacBlake2s::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Noise's `HKDF(ck, ikm, 2)`.
fn noise_hkdf2(ck: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let temp_key = hmac_blake2s(ck, ikm);
    let output1 = hmac_blake2s(&temp_key, &[0x01]);
    let mut info2 = Vec::with_capacity(33);
    info2.extend_from_slice(&output1);
    info2.push(0x02);
    let output2 = hmac_blake2s(&temp_key, &info2);
    (output1, output2)
}

/// Noise's `HKDF(ck, ikm, 3)`.
fn noise_hkdf3(ck: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32], [u8; 32]) {
    let temp_key = hmac_blake2s(ck, ikm);
    let output1 = hmac_blake2s(&temp_key, &[0x01]);
    let mut info2 = Vec::with_capacity(33);
    info2.extend_from_slice(&output1);
    info2.push(0x02);
    let output2 = hmac_blake2s(&temp_key, &info2);
    let mut info3 = Vec::with_capacity(33);
    info3.extend_from_slice(&output2);
    info3.push(0x03);
    let output3 = hmac_blake2s(&temp_key, &info3);
    (output1, output2, output3)
}

/// `(ck, k, h)`: 32-byte chaining key, optional 32-byte cipher key, 32-byte
/// transcript hash.
pub struct SymmetricState {
    ck: [u8; 32],
    k: Option<[u8; 32]>,
    h: [u8; 32],
}

impl SymmetricState {
    /// `h ← protocol_name` (zero-padded if short, hashed if long); `ck ←
    /// h`; `k` cleared; then `prologue` is mixed in.
    pub fn init(protocol_name: &str, prologue: &[u8]) -> Self {
        let name_bytes = protocol_name.as_bytes();
        let h = if name_bytes.len() <= 32 {
            let mut h = [0u8; 32];
            h[..name_bytes.len()].copy_from_slice(name_bytes);
            h
        } else {
            hash32(&[name_bytes])
        };
        let mut state = SymmetricState { ck: h, k: None, h };
        state.mix_hash(prologue);
        state
    }

    pub fn has_key(&self) -> bool {
        self.k.is_some()
    }

    pub fn mix_hash(&mut self, data: &[u8]) {
        self.h = hash32(&[&self.h, data]);
    }

    pub fn mix_key(&mut self, ikm: &[u8]) {
        let (ck2, k2) = noise_hkdf2(&self.ck, ikm);
        self.ck = ck2;
        self.k = Some(k2);
    }

    pub fn mix_key_and_hash(&mut self, ikm: &[u8]) {
        let (ck2, temp_h, k2) = noise_hkdf3(&self.ck, ikm);
        self.ck = ck2;
        self.mix_hash(&temp_h);
        self.k = Some(k2);
    }

    /// Seal `pt` with `k` (AD = current `h`) if a key is set, else pass it
    /// through unchanged; then mix the result into `h`.
    pub fn encrypt_and_hash(&mut self, pt: &[u8]) -> Vec<u8> {
        let ct = match &self.k {
            Some(k) => {
                let (mut ct, tags) = aead_seal_multi(pt, &self.h, k, std::slice::from_ref(k), 0);
                ct.extend_from_slice(&tags[0]);
                ct
            }
            None => pt.to_vec(),
        };
        self.mix_hash(&ct);
        ct
    }

    /// Inverse of [`Self::encrypt_and_hash`]. On tag failure, `h` is left
    /// untouched (per §4.2) so a caller may retry with a different key.
    pub fn decrypt_and_hash(&mut self, ct: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let pt = match &self.k {
            Some(k) => {
                if ct.len() < 16 {
                    return Err(HandshakeError::Auth);
                }
                let (body, tag) = ct.split_at(ct.len() - 16);
                let mut tag_arr = [0u8; 16];
                tag_arr.copy_from_slice(tag);
                aead_open_multi(body, &self.h, k, k, &tag_arr, 0).map_err(|_| HandshakeError::Auth)?
            }
            None => ct.to_vec(),
        };
        self.mix_hash(ct);
        Ok(pt)
    }

    /// `HKDF(ck, "", 2)` — the transport key pair handed off at the end of
    /// a handshake; `(first, second)` with no initiator/responder
    /// assignment (the caller reorders per its own role).
    pub fn split(&self) -> ([u8; 32], [u8; 32]) {
        noise_hkdf2(&self.ck, &[])
    }
}
