//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! # Layer 4: Hide/Reveal
//!
//! Layers a second, independently-keyed secret stream inside the filler
//! bytes of an outer [`crate::blockstream::BlockStream`] (§4.5). The outer
//! stream carries ordinary (bogus) cover data end to end; each of its
//! blocks donates its filler region to one frame of the inner stream. A
//! party holding only the outer key sees nothing but the cover data — the
//! filler bytes are already authenticated as part of the outer block they
//! sit in, so they look like any other padding, not like a second
//! ciphertext layer.
//!
//! The first inner frame is prefixed with an 8-byte little-endian length of
//! the whole secret, so [`reveal`] knows when to stop without the outer
//! stream needing any notion of an inner terminal block.
//!
//! ## Layer Contract
//!
//! **CAN import:** `blockstream`, `primitives`, `header` (for the outer
//! layer's [`crate::header::OpenedHeader`]), `error`, `secret`.
//! **NEVER imports:** `keystore`, `io`.

use std::io::{Read, Seek, Write};

use tracing::instrument;

use crate::blockstream::BlockStream;
use crate::error::HideError;
use crate::header::OpenedHeader;
use crate::primitives::aead::{aead_open_multi, aead_seal_multi};
use crate::primitives::dh::dh_shared;
use crate::primitives::hash::hash32;
use crate::primitives::kdf::kdf_password32;
use crate::primitives::rng::KeyedRng;

/// Per-frame overhead of the inner layer's own AEAD tag.
const INNER_TAG_LEN: usize = 16;
/// Extra overhead the first frame reserves for the 8-byte total-length
/// prefix, on top of the tag every frame pays.
const LENGTH_PREFIX_LEN: usize = 8;
const INNER_BASE_NONCE: u64 = 1;

fn inner_cap_for_block(bf: usize, block_index: u64) -> usize {
    let reserved = if block_index == 0 {
        INNER_TAG_LEN + LENGTH_PREFIX_LEN
    } else {
        INNER_TAG_LEN
    };
    bf.saturating_sub(reserved)
}

fn inner_ad(block_index: u64, terminal: bool) -> [u8; 1] {
    [if terminal {
        3
    } else if block_index == 0 {
        1
    } else {
        2
    }]
}

fn seal_inner_frame(key: &[u8; 32], block_index: u64, terminal: bool, plaintext: &[u8]) -> Vec<u8> {
    let ad = inner_ad(block_index, terminal);
    let nonce = INNER_BASE_NONCE.wrapping_add(block_index);
    let (mut ct, mut tags) =
        aead_seal_multi(plaintext, &ad, key, std::slice::from_ref(key), nonce);
    ct.extend_from_slice(&tags.remove(0));
    ct
}

fn open_inner_frame(
    key: &[u8; 32],
    block_index: u64,
    terminal: bool,
    sealed: &[u8],
) -> Result<Vec<u8>, HideError> {
    if sealed.len() < INNER_TAG_LEN {
        return Err(HideError::InnerPasswordOrNoSecret);
    }
    let (ct, tag) = sealed.split_at(sealed.len() - INNER_TAG_LEN);
    let mut tag_arr = [0u8; INNER_TAG_LEN];
    tag_arr.copy_from_slice(tag);
    let ad = inner_ad(block_index, terminal);
    let nonce = INNER_BASE_NONCE.wrapping_add(block_index);
    aead_open_multi(ct, &ad, key, key, &tag_arr, nonce).map_err(|_| HideError::InnerPasswordOrNoSecret)
}

/// Derive the inner key for the password variant: `kdf_password(pass2,
/// salt = K_w_outer ‖ base_nonce_outer, shifts_outer)`. Binding the salt to
/// the outer stream's own key and base nonce means the same inner password
/// used against two different cover files yields two unrelated inner keys.
pub fn derive_inner_key_password(
    outer_header: &OpenedHeader,
    inner_password: &[u8],
    shifts: u8,
) -> Result<[u8; 32], HideError> {
    let mut salt = Vec::with_capacity(32 + 8);
    salt.extend_from_slice(&outer_header.key);
    salt.extend_from_slice(&outer_header.base_nonce.to_le_bytes());
    kdf_password32(inner_password, &salt, shifts).map_err(|_| HideError::InnerPasswordOrNoSecret)
}

/// Derive the inner key for the public-key variant: `hash_long(DH(rx2,
/// tx_sec) ‖ K_w_outer)`.
pub fn derive_inner_key_public(outer_header: &OpenedHeader, their_pub2: &[u8; 32], our_sec2: &[u8; 32]) -> [u8; 32] {
    let shared = dh_shared(their_pub2, our_sec2);
    hash32(&[&shared, &outer_header.key])
}

/// Write `bogus` as the outer stream's visible payload, and layer `secret`
/// into the filler region of every block along the way. `outer_header` must
/// have come from a `write_*` header call against the same `io` the caller
/// is about to hand in here.
#[instrument(level = "debug", skip(io, bogus, secret, inner_key), fields(secret_len = secret.len()))]
pub fn write_hidden<S: Read + Write + Seek>(
    io: &mut S,
    outer_header: &OpenedHeader,
    body_start: u64,
    bogus: &[u8],
    inner_key: [u8; 32],
    secret: &[u8],
) -> Result<(), HideError> {
    let bf = outer_header.bf as usize;
    if bf <= INNER_TAG_LEN + LENGTH_PREFIX_LEN {
        return Err(HideError::FillerTooSmall(bf));
    }

    let mut outer = BlockStream::create(io, outer_header, body_start);
    let cap = outer.payload_cap();
    let mut cover_rng = KeyedRng::new(&inner_key);

    let mut remaining: &[u8] = secret;
    let mut bogus_cursor = 0usize;
    let mut block_index: u64 = 0;

    loop {
        let inner_cap = inner_cap_for_block(bf, block_index);
        let (mut frame_plaintext, terminal) = if block_index == 0 {
            let n = remaining.len().min(inner_cap);
            let mut pt = Vec::with_capacity(LENGTH_PREFIX_LEN + n);
            pt.extend_from_slice(&(secret.len() as u64).to_le_bytes());
            pt.extend_from_slice(&remaining[..n]);
            remaining = &remaining[n..];
            (pt, remaining.is_empty())
        } else {
            let n = remaining.len().min(inner_cap);
            let pt = remaining[..n].to_vec();
            remaining = &remaining[n..];
            (pt, remaining.is_empty())
        };

        // Every sealed frame must be exactly `bf` bytes so the reader can
        // locate the inner tag at a fixed offset (the last 16 bytes of the
        // filler) regardless of how much real secret data this block
        // carried; pad a short frame's payload with zeros rather than
        // leaving the leftover filler bytes unsealed. The reader discards
        // this padding via the length-prefixed `total_len` it already
        // tracks.
        let prefix_len = if block_index == 0 { LENGTH_PREFIX_LEN } else { 0 };
        let target_len = prefix_len + inner_cap;
        if frame_plaintext.len() < target_len {
            frame_plaintext.resize(target_len, 0);
        }

        let sealed = seal_inner_frame(&inner_key, block_index, terminal, &frame_plaintext);
        outer.write_filler_at_cursor(&sealed)?;

        let want = if terminal { cap.saturating_sub(1) } else { cap };
        let available = bogus.len().saturating_sub(bogus_cursor);
        let take = available.min(want);
        let mut chunk = bogus[bogus_cursor..bogus_cursor + take].to_vec();
        bogus_cursor += take;
        if chunk.len() < want {
            let mut pad = vec![0u8; want - chunk.len()];
            cover_rng.fill(&mut pad);
            chunk.extend_from_slice(&pad);
        }
        outer.write(&chunk)?;

        if terminal {
            break;
        }
        block_index += 1;
    }

    outer.close()?;
    Ok(())
}

/// Recover the secret hidden inside `io`'s filler bytes, given the outer
/// header and the derived inner key. Only the filler bytes are read — the
/// outer (bogus) payload is never touched — so `reveal` works whether or
/// not the caller is also interested in the bogus cover content.
#[instrument(level = "debug", skip(io, inner_key))]
pub fn reveal<S: Read + Write + Seek>(
    io: &mut S,
    outer_header: &OpenedHeader,
    body_start: u64,
    inner_key: [u8; 32],
) -> Result<Vec<u8>, HideError> {
    let mut outer = BlockStream::open(io, outer_header, body_start);

    let mut block_index: u64 = 0;
    let mut total_len: Option<u64> = None;
    let mut out = Vec::new();

    loop {
        let terminal_guess = total_len.is_some_and(|total| out.len() as u64 >= total);
        if terminal_guess {
            break;
        }
        let filler = outer.filler_at_cursor()?.to_vec();

        let tail_pt = if block_index == 0 {
            // We don't yet know if block 0 is also terminal; try both AD
            // bytes since the writer picks whichever was true at seal time.
            match open_inner_frame(&inner_key, 0, false, &filler) {
                Ok(pt) => pt,
                Err(_) => open_inner_frame(&inner_key, 0, true, &filler)?,
            }
        } else {
            match open_inner_frame(&inner_key, block_index, false, &filler) {
                Ok(pt) => pt,
                Err(_) => open_inner_frame(&inner_key, block_index, true, &filler)?,
            }
        };

        let payload = if block_index == 0 {
            if tail_pt.len() < LENGTH_PREFIX_LEN {
                return Err(HideError::InnerPasswordOrNoSecret);
            }
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&tail_pt[..LENGTH_PREFIX_LEN]);
            total_len = Some(u64::from_le_bytes(len_bytes));
            &tail_pt[LENGTH_PREFIX_LEN..]
        } else {
            &tail_pt[..]
        };
        out.extend_from_slice(payload);

        if let Some(total) = total_len {
            if out.len() as u64 >= total {
                out.truncate(total as usize);
                break;
            }
        }

        outer.advance_block()?;
        block_index += 1;
    }

    Ok(out)
}
