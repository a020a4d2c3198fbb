//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! The password header: `salt[32] ‖ aead_seal(param_block, K_w, nonce64=0)`.
//!
//! Every sensitive random draw — the salt, and the shape of `bs`/`bf` when
//! left unspecified — comes from a [`KeyedRng`] seeded with the password
//! itself, so a repeated encryption of the same password still produces an
//! unpredictable salt without depending on any other entropy source being
//! available at the call site.

use std::io::{Read, Write};

use tracing::{debug, instrument};

use super::{adjust_bs_bf, read_exact_or, validate_bs_bf, OpenedHeader};
use crate::error::HeaderError;
use crate::primitives::aead::{aead_open, aead_seal};
use crate::primitives::kdf::kdf_password32;
use crate::primitives::rng::KeyedRng;

const SALT_LEN: usize = 32;
const PARAM_BLOCK_LEN: usize = 8;
const SEALED_PARAM_LEN: usize = PARAM_BLOCK_LEN + 16;

/// Write a password header and return the transport key / base nonce / block
/// shape the caller needs to start the block-stream body.
#[instrument(level = "debug", skip(sink, password))]
pub fn write_password_header<W: Write>(
    sink: &mut W,
    password: &[u8],
    bs: Option<u32>,
    bf: Option<u32>,
    shifts: u8,
) -> Result<OpenedHeader, HeaderError> {
    let mut rng = KeyedRng::new(password);
    let (bs, bf) = adjust_bs_bf(bs, bf, &mut rng)?;

    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt);

    let key = kdf_password32(password, &salt, shifts)
        .map_err(|e| HeaderError::ParamOutOfRange(e.to_string()))?;

    let mut param = [0u8; PARAM_BLOCK_LEN];
    param[0..4].copy_from_slice(&bs.to_le_bytes());
    param[4..8].copy_from_slice(&bf.to_le_bytes());
    let sealed = aead_seal(&param, &key, 0);

    sink.write_all(&salt)?;
    sink.write_all(&sealed)?;
    debug!(bs, bf, shifts, "wrote password header");

    Ok(OpenedHeader {
        key,
        base_nonce: 1,
        bs,
        bf,
        keys_auth: vec![key],
        n_recipients: 1,
        tag_index: 0,
    })
}

/// Read a password header, trying every KDF cost from `0..=shifts_max` in
/// order and accepting the first whose 16-byte tag authenticates. Bounding
/// `shifts_max` keeps a malformed or unrelated file from turning into an
/// unbounded memory-hard computation loop.
#[instrument(level = "debug", skip(source, password))]
pub fn read_password_header<R: Read>(
    source: &mut R,
    password: &[u8],
    shifts_max: u8,
) -> Result<OpenedHeader, HeaderError> {
    let mut salt = [0u8; SALT_LEN];
    read_exact_or(source, &mut salt, HeaderError::Truncated)?;
    let mut sealed = [0u8; SEALED_PARAM_LEN];
    read_exact_or(source, &mut sealed, HeaderError::Truncated)?;

    for shifts in 0..=shifts_max {
        let key = match kdf_password32(password, &salt, shifts) {
            Ok(k) => k,
            Err(_) => continue,
        };
        if let Ok(param) = aead_open(&sealed, &key, 0) {
            if param.len() != PARAM_BLOCK_LEN {
                continue;
            }
            let bs = u32::from_le_bytes(param[0..4].try_into().unwrap());
            let bf = u32::from_le_bytes(param[4..8].try_into().unwrap());
            validate_bs_bf(bs, bf)?;
            debug!(bs, bf, shifts, "accepted password header");
            return Ok(OpenedHeader {
                key,
                base_nonce: 1,
                bs,
                bf,
                keys_auth: vec![key],
                n_recipients: 1,
                tag_index: 0,
            });
        }
    }
    Err(HeaderError::PasswordOrCorrupt(shifts_max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let mut buf = Vec::new();
        let written =
            write_password_header(&mut buf, b"correct horse battery staple", Some(4096), Some(64), 4)
                .unwrap();
        assert_eq!(buf.len(), 32 + 24);

        let mut cursor = Cursor::new(buf);
        let read = read_password_header(&mut cursor, b"correct horse battery staple", 20).unwrap();
        assert_eq!(read.key, written.key);
        assert_eq!(read.bs, 4096);
        assert_eq!(read.bf, 64);
        assert_eq!(read.base_nonce, 1);
    }

    #[test]
    fn wrong_password_is_password_or_corrupt() {
        let mut buf = Vec::new();
        write_password_header(&mut buf, b"right", Some(4096), Some(64), 2).unwrap();
        let mut cursor = Cursor::new(buf);
        let err = read_password_header(&mut cursor, b"wrong", 4).unwrap_err();
        assert!(matches!(err, HeaderError::PasswordOrCorrupt(4)));
    }

    #[test]
    fn unspecified_shape_is_recoverable() {
        let mut buf = Vec::new();
        let written = write_password_header(&mut buf, b"pw", None, None, 2).unwrap();
        let mut cursor = Cursor::new(buf);
        let read = read_password_header(&mut cursor, b"pw", 20).unwrap();
        assert_eq!(read.bs, written.bs);
        assert_eq!(read.bf, written.bf);
    }

    #[test]
    fn truncated_header_is_truncated_error() {
        let mut cursor = Cursor::new(vec![0u8; 10]);
        let err = read_password_header(&mut cursor, b"pw", 4).unwrap_err();
        assert!(matches!(err, HeaderError::Truncated));
    }
}
