//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Randomness: the bare OS CSPRNG for non-sensitive use, and a keyed CSPRNG
//! owned exclusively by one stream or handshake for every sensitive draw
//! (ephemeral keys, filler bytes, salts, spoof dummy branches).

use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::hash::hash_long;

/// Fill `out` with OS-CSPRNG bytes. Used for values that do not need to be
/// reproducible from a caller secret — e.g. the salt of a password header,
/// which is itself the thing that makes repeated encryptions of the same
/// password differ.
pub fn random_bytes(out: &mut [u8]) {
    OsRng.fill_bytes(out);
}

/// A CSPRNG seeded once from OS entropy mixed with caller-supplied entropy
/// (a sender's secret key, or a password), and then owned exclusively by
/// the stream or handshake that created it for the rest of its lifetime.
///
/// OS entropy is mixed in at every construction, so draws are never
/// reproducible across instances even given the same caller entropy — the
/// caller entropy only binds a stream's "random" choices (filler bytes,
/// ephemeral keys, spoof dummy branches) to a secret the stream's owner
/// controls, it does not make them deterministic.
#[derive(ZeroizeOnDrop)]
pub struct KeyedRng {
    #[zeroize(skip)]
    inner: ChaCha20Rng,
}

impl KeyedRng {
    /// Seed from OS entropy mixed with `entropy` via the crate's parametric
    /// hash. `entropy` may be empty (the anonymous-spoof case noted in
    /// `header`/`hide`), in which case this reduces to OS-entropy seeding
    /// only.
    pub fn new(entropy: &[u8]) -> Self {
        let mut os_bytes = [0u8; 32];
        random_bytes(&mut os_bytes);
        let mut seed_material = hash_long(32, None, &[&os_bytes, entropy])
            .expect("out_len=32 is always in range");
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&seed_material);
        seed_material.zeroize();
        KeyedRng {
            inner: ChaCha20Rng::from_seed(seed),
        }
    }

    /// Fill `out` with the next bytes drawn from this stream's keyed RNG.
    pub fn fill(&mut self, out: &mut [u8]) {
        self.inner.fill_bytes(out);
    }

    /// Draw a fresh 32-byte value — used for ephemeral DH seeds and filler
    /// regeneration.
    pub fn next32(&mut self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.fill(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_entropy_reproduces_sequence() {
        // KeyedRng still mixes in OS entropy at construction, so two
        // instances seeded with the same caller entropy diverge — this
        // test only checks that a single instance produces a stable,
        // non-degenerate sequence of draws.
        let mut rng = KeyedRng::new(b"some caller secret");
        let a = rng.next32();
        let b = rng.next32();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_entropy_is_accepted() {
        let mut rng = KeyedRng::new(&[]);
        let _ = rng.next32();
    }
}
