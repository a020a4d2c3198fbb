//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! The password-based transport-key derivation. `shifts` is literally the
//! scrypt cost log `logN`; at the spec's fixed `r = 8` that makes memory
//! use `128 * r * 2^shifts` bytes = `2^shifts` KiB exactly, so no extra
//! scaling arithmetic is needed beyond passing `shifts` straight through.

use scrypt::{scrypt, Params};

use crate::error::PrimitiveError;

/// Default KDF cost exponent used when a caller does not specify one.
pub const DEFAULT_SHIFTS: u8 = 14;

/// Default ceiling a header reader will search up to before giving up with
/// `PasswordOrCorrupt` — bounds the cost of trying every `shifts` value
/// against a malformed or unrelated file.
pub const DEFAULT_SHIFTS_MAX: u8 = 20;

/// Derive `out_len` bytes from `password` and `salt` at cost `shifts`
/// (`logN`), with `r = 8, p = 1` fixed per the spec.
pub fn kdf_password(out_len: usize, password: &[u8], salt: &[u8], shifts: u8) -> Result<Vec<u8>, PrimitiveError> {
    let params = Params::new(shifts, 8, 1, out_len)
        .map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?;
    let mut out = vec![0u8; out_len];
    scrypt(password, salt, &params, &mut out).map_err(|_| PrimitiveError::HashLenOutOfRange(out_len))?;
    Ok(out)
}

/// Derive a 32-byte transport key, the shape every caller in this crate
/// actually needs.
pub fn kdf_password32(password: &[u8], salt: &[u8], shifts: u8) -> Result<[u8; 32], PrimitiveError> {
    let v = kdf_password(32, password, salt, shifts)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&v);
    Ok(out)
}
