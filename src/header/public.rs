//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! The public (recipient-list) header: one 129-byte Noise-`X` branch per
//! recipient, followed by a parameter block sealed under every recipient's
//! auxiliary key.
//!
//! ## Why this isn't built on [`crate::handshake::HandshakeState`]
//!
//! Every other Noise exchange in this crate fits the generic pattern engine:
//! one party's local static secret and the value it sends for the `s` token
//! are always the same key. The spoof variant in [`write_spoof_header`]
//! breaks that assumption on purpose — the branch is built using the real
//! *spoofer's* secret (for the `es`/`ss` Diffie-Hellman steps, which only
//! ever need a public value on one side) while the plaintext sent for the
//! `s` token is the *impersonated* sender's public key, not the spoofer's
//! own. `HandshakeState`'s `Token::S` handler always sends `self.s.public`,
//! so it cannot express that. [`seal_branch`]/[`open_branch`] instead roll
//! the five-token `X` message out directly over
//! [`crate::handshake::SymmetricState`], parameterising exactly the two
//! quantities that differ between a genuine and a spoofed branch: the
//! public key mixed into the transcript before the ephemeral, and the
//! already-computed `es`/`ss` shared secrets. This mirrors the original
//! tool's own `create_hsx`/`read_pub_header`, which are themselves
//! hand-written rather than built on a generic pattern engine.

use std::io::{Read, Write};

use tracing::{debug, instrument, warn};

use super::{adjust_bs_bf, validate_bs_bf, OpenedHeader};
use crate::error::HeaderError;
use crate::handshake::{protocol_name, SymmetricState};
use crate::primitives::aead::{aead_open_multi, aead_seal_multi};
use crate::primitives::dh::{dh_shared, DhKeyPair};
use crate::primitives::elligator;
use crate::primitives::rng::KeyedRng;

/// `e_repr(32) ‖ encrypt_and_hash(static)(48) ‖ encrypt_and_hash(payload)(49)`.
pub const BRANCH_LEN: usize = 129;

/// The wire format's recipient count is a single byte (§4.3).
pub const MAX_RECIPIENTS: usize = 255;

const PARAM_BLOCK_LEN: usize = 12;
const SYMK_LEN: usize = 33;

/// Build one 129-byte branch. `h_seed_pub` is the public key both the
/// builder and the eventual reader mix into the transcript before any
/// token (the real reader's own static, in every case this crate produces);
/// `es_peer_pub` is the public value the ephemeral DHs against for the `es`
/// token; `static_field_plaintext` is what gets sent (encrypted) for the
/// `s` token; `ss_shared` is the already-computed `ss` shared secret.
fn seal_branch(
    h_seed_pub: &[u8; 32],
    es_peer_pub: &[u8; 32],
    rng: &mut KeyedRng,
    static_field_plaintext: &[u8; 32],
    ss_shared: &[u8; 32],
    payload: &[u8; SYMK_LEN],
) -> ([u8; BRANCH_LEN], [u8; 32]) {
    let mut ss = SymmetricState::init(&protocol_name("X"), b"");
    ss.mix_hash(h_seed_pub);

    let (ephemeral_repr, ephemeral) = loop {
        let seed = rng.next32();
        let candidate = DhKeyPair::from_seed(seed);
        if let Ok(repr) = elligator::public_to_representative(&candidate.public) {
            break (repr, candidate);
        }
    };
    ss.mix_hash(&ephemeral_repr);

    let es_shared = dh_shared(es_peer_pub, ephemeral.secret.expose_secret());
    ss.mix_key(&es_shared);
    let enc_static = ss.encrypt_and_hash(static_field_plaintext);

    ss.mix_key(ss_shared);
    let enc_payload = ss.encrypt_and_hash(payload);

    let (ka, _) = ss.split();

    let mut out = [0u8; BRANCH_LEN];
    out[0..32].copy_from_slice(&ephemeral_repr);
    out[32..80].copy_from_slice(&enc_static);
    out[80..129].copy_from_slice(&enc_payload);
    (out, ka)
}

/// Attempt to open `branch` as the responder holding `self_kp`. Returns the
/// claimed sender's public key, the 33-byte payload (`symk ‖ n_recipients`),
/// and this branch's auxiliary key. Fails (without distinguishing *why* —
/// every failure here collapses to "not addressed to me") on any tag
/// mismatch, exactly as §4.3 specifies for the reader's branch search.
fn open_branch(
    branch: &[u8; BRANCH_LEN],
    self_kp: &DhKeyPair,
) -> Result<([u8; 32], [u8; SYMK_LEN], [u8; 32]), HeaderError> {
    let mut ss = SymmetricState::init(&protocol_name("X"), b"");
    ss.mix_hash(&self_kp.public);

    let mut er = [0u8; 32];
    er.copy_from_slice(&branch[0..32]);
    ss.mix_hash(&er);
    let ephemeral_pub = elligator::representative_to_public(&er);

    let es_shared = dh_shared(&ephemeral_pub, self_kp.secret.expose_secret());
    ss.mix_key(&es_shared);
    let static_pt = ss
        .decrypt_and_hash(&branch[32..80])
        .map_err(|_| HeaderError::NotARecipient)?;
    if static_pt.len() != 32 {
        return Err(HeaderError::NotARecipient);
    }
    let mut sender = [0u8; 32];
    sender.copy_from_slice(&static_pt);

    let ss_shared = dh_shared(&sender, self_kp.secret.expose_secret());
    ss.mix_key(&ss_shared);
    let payload_pt = ss
        .decrypt_and_hash(&branch[80..129])
        .map_err(|_| HeaderError::NotARecipient)?;
    if payload_pt.len() != SYMK_LEN {
        return Err(HeaderError::NotARecipient);
    }
    let mut payload = [0u8; SYMK_LEN];
    payload.copy_from_slice(&payload_pt);

    let (ka, _) = ss.split();
    Ok((sender, payload, ka))
}

fn seal_param_block(
    key: &[u8; 32],
    kav: &[[u8; 32]],
    nonce64: u64,
    bs: u32,
    bf: u32,
    info_size: u32,
) -> (Vec<u8>, Vec<[u8; 16]>) {
    let mut param = [0u8; PARAM_BLOCK_LEN];
    param[0..4].copy_from_slice(&bs.to_le_bytes());
    param[4..8].copy_from_slice(&bf.to_le_bytes());
    param[8..12].copy_from_slice(&info_size.to_le_bytes());
    aead_seal_multi(&param, &[], key, kav, nonce64)
}

/// Write a public header: one branch per entry of `recipients`, then the
/// parameter block authenticated under every recipient's auxiliary key. If
/// `info` is provided, an extension block follows at nonce 1 and the body's
/// base nonce becomes 2 instead of 1.
#[instrument(level = "debug", skip(sink, sender, recipients, info))]
pub fn write_public_header<W: Write>(
    sink: &mut W,
    bs: Option<u32>,
    bf: Option<u32>,
    sender: &DhKeyPair,
    recipients: &[[u8; 32]],
    info: Option<&[u8]>,
) -> Result<OpenedHeader, HeaderError> {
    if recipients.is_empty() || recipients.len() > MAX_RECIPIENTS {
        return Err(HeaderError::TooManyRecipients(recipients.len()));
    }
    let mut rng = KeyedRng::new(sender.secret.expose_secret());
    let (bs, bf) = adjust_bs_bf(bs, bf, &mut rng)?;

    let mut symk = [0u8; SYMK_LEN];
    rng.fill(&mut symk[0..32]);
    symk[32] = recipients.len() as u8;

    let mut kav = Vec::with_capacity(recipients.len());
    for recipient_pub in recipients {
        let ss_shared = dh_shared(recipient_pub, sender.secret.expose_secret());
        let (branch, ka) = seal_branch(recipient_pub, recipient_pub, &mut rng, &sender.public, &ss_shared, &symk);
        sink.write_all(&branch)?;
        kav.push(ka);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&symk[0..32]);

    let info_size = info.map(|b| b.len() as u32).unwrap_or(0);
    let (param_ct, param_tags) = seal_param_block(&key, &kav, 0, bs, bf, info_size);
    sink.write_all(&param_ct)?;
    for tag in &param_tags {
        sink.write_all(tag)?;
    }

    let base_nonce = if let Some(info_bytes) = info {
        let (info_ct, info_tags) = aead_seal_multi(info_bytes, &[], &key, &kav, 1);
        sink.write_all(&info_ct)?;
        for tag in &info_tags {
            sink.write_all(tag)?;
        }
        2
    } else {
        1
    };

    debug!(n_recipients = recipients.len(), bs, bf, "wrote public header");
    let n_recipients = recipients.len();
    Ok(OpenedHeader {
        key,
        base_nonce,
        bs,
        bf,
        keys_auth: kav,
        n_recipients,
        tag_index: 0,
    })
}

/// A public header's worth of context a recipient learns on open: the
/// stream parameters, the sender's claimed public key, and any extension
/// bytes written alongside the parameter block.
pub struct OpenedPublicHeader {
    pub header: OpenedHeader,
    pub sender: [u8; 32],
    pub info: Option<Vec<u8>>,
}

/// Try each branch in turn as the responder holding `recipient`'s secret,
/// up to [`MAX_RECIPIENTS`], accepting the first that authenticates — this
/// is the same code path for a genuine header or a [`write_spoof_header`]
/// deniable one; the reader cannot and does not need to tell them apart.
#[instrument(level = "debug", skip(source, recipient))]
pub fn read_public_header<R: Read>(
    source: &mut R,
    recipient: &DhKeyPair,
) -> Result<OpenedPublicHeader, HeaderError> {
    let mut branch = [0u8; BRANCH_LEN];
    let mut found: Option<(usize, [u8; 32], [u8; SYMK_LEN], [u8; 32])> = None;
    let mut n_recipients = 0usize;

    let mut i = 0;
    loop {
        if found.is_some() && i >= n_recipients {
            break;
        }
        if i >= MAX_RECIPIENTS {
            break;
        }
        if source.read_exact(&mut branch).is_err() {
            if found.is_none() {
                return Err(HeaderError::NotARecipient);
            }
            return Err(HeaderError::Truncated);
        }
        if found.is_none() {
            if let Ok((sender, payload, ka)) = open_branch(&branch, recipient) {
                n_recipients = payload[32] as usize;
                found = Some((i, sender, payload, ka));
            }
        }
        i += 1;
    }

    let (keypos, sender, payload, ka) = found.ok_or(HeaderError::NotARecipient)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&payload[0..32]);
    debug!(keypos, n_recipients, "matched recipient branch");

    let mut param_ct = vec![0u8; PARAM_BLOCK_LEN];
    source
        .read_exact(&mut param_ct)
        .map_err(|_| HeaderError::Truncated)?;
    let mut param_tags = vec![0u8; 16 * n_recipients];
    source
        .read_exact(&mut param_tags)
        .map_err(|_| HeaderError::Truncated)?;
    let mut param_tag = [0u8; 16];
    param_tag.copy_from_slice(&param_tags[keypos * 16..keypos * 16 + 16]);
    let param = aead_open_multi(&param_ct, &[], &key, &ka, &param_tag, 0)
        .map_err(|_| HeaderError::NotARecipient)?;
    if param.len() != PARAM_BLOCK_LEN {
        return Err(HeaderError::Truncated);
    }
    let bs = u32::from_le_bytes(param[0..4].try_into().unwrap());
    let bf = u32::from_le_bytes(param[4..8].try_into().unwrap());
    let info_size = u32::from_le_bytes(param[8..12].try_into().unwrap());
    validate_bs_bf(bs, bf)?;

    let (base_nonce, info) = if info_size > 0 {
        let mut info_ct = vec![0u8; info_size as usize];
        source
            .read_exact(&mut info_ct)
            .map_err(|_| HeaderError::Truncated)?;
        let mut info_tags = vec![0u8; 16 * n_recipients];
        source
            .read_exact(&mut info_tags)
            .map_err(|_| HeaderError::Truncated)?;
        let mut info_tag = [0u8; 16];
        info_tag.copy_from_slice(&info_tags[keypos * 16..keypos * 16 + 16]);
        let info_pt = aead_open_multi(&info_ct, &[], &key, &ka, &info_tag, 1)
            .map_err(|_| HeaderError::NotARecipient)?;
        (2, Some(info_pt))
    } else {
        (1, None)
    };

    Ok(OpenedPublicHeader {
        header: OpenedHeader {
            key,
            base_nonce,
            bs,
            bf,
            keys_auth: vec![ka],
            n_recipients,
            tag_index: keypos,
        },
        sender,
        info,
    })
}

/// Write a deniable header: branch 0 is built so that opening it with
/// `named_sender`'s secret absent entirely still authenticates under
/// `spoofer`'s own static key, and reports `named_sender`'s public key as
/// the sender — because the branch is constructed using `spoofer`'s real
/// secret (for `es`/`ss`, which here only ever need `named_sender`'s public
/// half) plus `named_sender`'s public key sent as the plaintext `s` field.
/// Branches `1..=n_dummies` are filled with the keyed RNG and never parse as
/// anything; the header is byte-length-identical to a genuine one.
///
/// If `spoofer`'s secret is unavailable (a fully anonymous spoof, with no
/// real key backing the deniable message at all), the caller has no
/// `DhKeyPair` to pass here in the first place — this crate does not
/// support that weaker case, matching the tool this format is modelled on:
/// every spoof still requires *some* real secret to drive the keyed RNG
/// and the `es`/`ss` Diffie-Hellman steps. Without it, dummy branches would
/// fall back to OS-entropy seeding only, which is security-relevant enough
/// to call out rather than silently allow.
#[instrument(level = "debug", skip(sink, spoofer))]
pub fn write_spoof_header<W: Write>(
    sink: &mut W,
    bs: Option<u32>,
    bf: Option<u32>,
    spoofer: &DhKeyPair,
    named_sender: &[u8; 32],
    n_dummies: usize,
) -> Result<OpenedHeader, HeaderError> {
    let total = n_dummies + 1;
    if total > MAX_RECIPIENTS {
        return Err(HeaderError::TooManyRecipients(total));
    }
    let mut rng = KeyedRng::new(spoofer.secret.expose_secret());
    let (bs, bf) = adjust_bs_bf(bs, bf, &mut rng)?;

    let mut symk = [0u8; SYMK_LEN];
    rng.fill(&mut symk[0..32]);
    symk[32] = total as u8;

    let ss_shared = dh_shared(named_sender, spoofer.secret.expose_secret());
    let (branch0, ka0) = seal_branch(
        &spoofer.public,
        &spoofer.public,
        &mut rng,
        named_sender,
        &ss_shared,
        &symk,
    );
    sink.write_all(&branch0)?;

    let mut kav = vec![ka0];
    for _ in 0..n_dummies {
        let mut dummy = [0u8; BRANCH_LEN];
        rng.fill(&mut dummy);
        sink.write_all(&dummy)?;
        kav.push(rng.next32());
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&symk[0..32]);
    let (param_ct, param_tags) = seal_param_block(&key, &kav, 0, bs, bf, 0);
    sink.write_all(&param_ct)?;
    for tag in &param_tags {
        sink.write_all(tag)?;
    }

    warn!(
        n_dummies,
        "wrote spoofed header: dummy branches use the spoofer's own key as RNG entropy, not an anonymous source"
    );
    Ok(OpenedHeader {
        key,
        base_nonce: 1,
        bs,
        bf,
        keys_auth: kav,
        n_recipients: total,
        tag_index: 0,
    })
}
