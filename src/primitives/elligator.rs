//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Elligator2: encoding X25519 public keys as 32-byte strings that are
//! computationally indistinguishable from uniform random, and decoding
//! those representatives back to public keys.
//!
//! `x25519-dalek` does not expose this — its field-element type is
//! private — so this module implements `GF(2^255-19)` arithmetic directly
//! over `num-bigint`. The map follows the curve25519 instance of Elligator2
//! (Bernstein, Hamburg, Krasnova, Lange; the same map small portable X25519
//! implementations such as Monocypher expose as
//! `crypto_hidden_to_curve`/`crypto_hidden_from_curve`), specialised to the
//! Montgomery `u`-coordinate since that is all X25519 needs.
//!
//! Not constant-time: representatives and public keys are not secret once
//! they are on the wire, only the scalar is, and the scalar never passes
//! through this module.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::PrimitiveError;

const CURVE_A: u32 = 486662;

fn p_modulus() -> BigUint {
    (BigUint::one() << 255) - 19u32
}

fn field_from_bytes(bytes: &[u8; 32]) -> BigUint {
    let mut masked = *bytes;
    masked[31] &= 0x7f;
    BigUint::from_bytes_le(&masked) % p_modulus()
}

fn field_to_bytes(n: &BigUint) -> [u8; 32] {
    let bytes = n.to_bytes_le();
    let mut out = [0u8; 32];
    out[..bytes.len().min(32)].copy_from_slice(&bytes[..bytes.len().min(32)]);
    out
}

fn neg_mod(a: &BigUint, p: &BigUint) -> BigUint {
    if a.is_zero() {
        BigUint::zero()
    } else {
        p - (a % p)
    }
}

fn mod_inverse(a: &BigUint, p: &BigUint) -> Option<BigUint> {
    if a.is_zero() {
        return None;
    }
    let two = BigUint::from(2u32);
    Some(a.modpow(&(p - &two), p))
}

/// Euler's criterion: `1` if `a` is a nonzero square mod `p`, `-1` (as
/// `p - 1`) if a nonresidue, `0` if `a == 0`. `p` is prime so this is exact.
fn legendre(a: &BigUint, p: &BigUint) -> i8 {
    if a.is_zero() {
        return 0;
    }
    let two = BigUint::from(2u32);
    let exp = (p - BigUint::one()) / &two;
    let r = a.modpow(&exp, p);
    if r.is_one() {
        1
    } else {
        -1
    }
}

/// `p ≡ 5 (mod 8)` for `p = 2^255 - 19`, so the square root (when it
/// exists) is computable with the standard Atkin-style formula used
/// throughout Ed25519/X25519 reference code.
fn sqrt_mod_p(a: &BigUint, p: &BigUint) -> Option<BigUint> {
    if legendre(a, p) == -1 {
        return None;
    }
    if a.is_zero() {
        return Some(BigUint::zero());
    }
    let eight = BigUint::from(8u32);
    let exp = (p + BigUint::from(3u32)) / &eight;
    let mut x = a.modpow(&exp, p);
    let two = BigUint::from(2u32);
    if &x.modpow(&two, p) != a {
        let four = BigUint::from(4u32);
        let i_exp = (p - BigUint::one()) / &four;
        let i = two.modpow(&i_exp, p);
        x = (x * i) % p;
    }
    Some(x)
}

fn curve_rhs(v: &BigUint, p: &BigUint) -> BigUint {
    let a = BigUint::from(CURVE_A);
    let v2 = v.modpow(&BigUint::from(2u32), p);
    let v3 = (&v2 * v) % p;
    (v3 + (&a * &v2) % p + v) % p
}

/// One branch of the Elligator2 preimage search: does `v` admit a
/// representative? Succeeds iff `-(A + v) / (2v)` is a square mod `p`.
fn try_branch(v: &BigUint, p: &BigUint) -> Option<BigUint> {
    if v.is_zero() {
        return None;
    }
    let a = BigUint::from(CURVE_A);
    let two = BigUint::from(2u32);
    let two_v = (&two * v) % p;
    let inv_two_v = mod_inverse(&two_v, p)?;
    let a_plus_v = (&a + v) % p;
    let r2 = (neg_mod(&a_plus_v, p) * inv_two_v) % p;
    sqrt_mod_p(&r2, p)
}

/// Decode a 32-byte representative to the X25519 `u`-coordinate it stands
/// for. Always succeeds (any 32-byte string, after the high-bit mask, is a
/// valid representative of some point).
pub fn representative_to_public(repr: &[u8; 32]) -> [u8; 32] {
    let p = p_modulus();
    let a = BigUint::from(CURVE_A);
    let r = field_from_bytes(repr);
    let r2 = (&r * &r) % &p;
    let denom = (BigUint::from(2u32) * &r2 + BigUint::one()) % &p;
    let inv_denom = mod_inverse(&denom, &p).unwrap_or_else(BigUint::zero);
    let v = (neg_mod(&a, &p) * inv_denom) % &p;
    let rhs = curve_rhs(&v, &p);
    let e = legendre(&rhs, &p);
    let x = if e >= 0 {
        v
    } else {
        neg_mod(&((v + &a) % &p), &p)
    };
    field_to_bytes(&x)
}

/// Encode an X25519 public key as a 32-byte uniform representative.
/// Succeeds for roughly half of all public keys, per the Elligator2
/// density bound; callers generating ephemeral keys should resample (a
/// fresh [`super::dh::DhKeyPair`] from a new [`super::rng::KeyedRng`] draw)
/// on `Err`.
pub fn public_to_representative(public: &[u8; 32]) -> Result<[u8; 32], PrimitiveError> {
    let p = p_modulus();
    let a = BigUint::from(CURVE_A);
    let u = field_from_bytes(public);

    if let Some(r) = try_branch(&u, &p) {
        return Ok(field_to_bytes(&canonical_root(r, &p)));
    }
    let neg_u_minus_a = neg_mod(&((u + &a) % &p), &p);
    if let Some(r) = try_branch(&neg_u_minus_a, &p) {
        return Ok(field_to_bytes(&canonical_root(r, &p)));
    }
    Err(PrimitiveError::ElligatorEncodeFailed)
}

/// Of `{r, p - r}`, pick the smaller — an arbitrary but fixed convention so
/// encoding is deterministic given `u`.
fn canonical_root(r: BigUint, p: &BigUint) -> BigUint {
    let neg_r = neg_mod(&r, p);
    if neg_r < r {
        neg_r
    } else {
        r
    }
}
