//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! X25519 key agreement and Ed25519 signatures, both over the crate's
//! single 32-byte public-key encoding.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::PrimitiveError;
use crate::secret::Secret;

/// An X25519 key pair, generated from caller-supplied randomness so tests
/// and [`super::rng::KeyedRng`]-driven ephemeral generation can both use it.
pub struct DhKeyPair {
    pub public: [u8; 32],
    pub secret: Secret<[u8; 32]>,
}

impl DhKeyPair {
    /// Derive a key pair from 32 bytes of randomness (clamped internally by
    /// `x25519-dalek`, per the X25519 spec).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        DhKeyPair {
            public: *public.as_bytes(),
            secret: Secret::new(secret.to_bytes()),
        }
    }
}

/// Scalar multiplication: `DH(their_pub, our_sec) -> 32-byte shared secret`.
pub fn dh_shared(their_pub: &[u8; 32], our_sec: &[u8; 32]) -> [u8; 32] {
    let secret = StaticSecret::from(*our_sec);
    let public = PublicKey::from(*their_pub);
    secret.diffie_hellman(&public).to_bytes()
}

/// An Ed25519 signing key pair.
pub struct SigningKeyPair {
    pub public: [u8; 32],
    pub secret: Secret<[u8; 32]>,
}

impl SigningKeyPair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        SigningKeyPair {
            public: verifying_key.to_bytes(),
            secret: Secret::new(seed),
        }
    }
}

/// Sign `msg` under a domain separator `ctx_string`, producing a 64-byte
/// signature over `ctx_string ‖ msg`. Mirrors the teacher's
/// `sign_manifest_with_domain` convention of mixing a fixed context prefix
/// into every signed message rather than relying on Ed25519ph/ctx features.
pub fn sign(ctx_string: &[u8], msg: &[u8], sec: &[u8; 32]) -> [u8; 64] {
    let signing_key = SigningKey::from_bytes(sec);
    let mut full = Vec::with_capacity(ctx_string.len() + msg.len());
    full.extend_from_slice(ctx_string);
    full.extend_from_slice(msg);
    signing_key.sign(&full).to_bytes()
}

/// Verify a signature produced by [`sign`].
pub fn verify(ctx_string: &[u8], msg: &[u8], sig: &[u8; 64], public: &[u8; 32]) -> Result<(), PrimitiveError> {
    let verifying_key =
        VerifyingKey::from_bytes(public).map_err(|_| PrimitiveError::SignatureInvalid)?;
    let signature = Signature::from_bytes(sig);
    let mut full = Vec::with_capacity(ctx_string.len() + msg.len());
    full.extend_from_slice(ctx_string);
    full.extend_from_slice(msg);
    verifying_key
        .verify(&full, &signature)
        .map_err(|_| PrimitiveError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_is_symmetric() {
        let a = DhKeyPair::from_seed([1u8; 32]);
        let b = DhKeyPair::from_seed([2u8; 32]);
        let shared_a = dh_shared(&b.public, a.secret.expose_secret());
        let shared_b = dh_shared(&a.public, b.secret.expose_secret());
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn sign_verify_round_trip() {
        let kp = SigningKeyPair::from_seed([5u8; 32]);
        let sig = sign(b"Key signature prefix", b"hello", kp.secret.expose_secret());
        verify(b"Key signature prefix", b"hello", &sig, &kp.public).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_domain() {
        let kp = SigningKeyPair::from_seed([6u8; 32]);
        let sig = sign(b"Key signature prefix", b"hello", kp.secret.expose_secret());
        let err = verify(b"Amber signature prefix", b"hello", &sig, &kp.public).unwrap_err();
        assert_eq!(err, PrimitiveError::SignatureInvalid);
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = SigningKeyPair::from_seed([7u8; 32]);
        let sig = sign(b"ctx", b"hello", kp.secret.expose_secret());
        assert!(verify(b"ctx", b"hellp", &sig, &kp.public).is_err());
    }
}
