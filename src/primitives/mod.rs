//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! # Layer 1: Cryptographic primitives
//!
//! Pure cryptographic building blocks with no knowledge of wire formats,
//! files, or key storage. Every other module in this crate is built only
//! out of the functions exposed here.
//!
//! ## Layer Contract
//!
//! **What belongs here:**
//! - The block-counter stream cipher ([`stream`]) and the multi-tag AEAD
//!   built from it ([`aead`])
//! - The parametric hash ([`hash`]) and the password KDF ([`kdf`])
//! - X25519/Ed25519 key agreement and signatures ([`dh`]), plus the
//!   Elligator2 uniform public-key encoding ([`elligator`])
//! - CSPRNG access, both system-seeded and keyed ([`rng`])
//! - No business logic, no I/O, no knowledge of block/header/key-store
//!   framing
//!
//! **CAN import:**
//! - Standard library (`std::*`)
//! - Crypto crates: `chacha20`, `poly1305`, `blake2`, `digest`, `hmac`,
//!   `scrypt`, `x25519-dalek`, `ed25519-dalek`, `num-bigint`, `num-traits`,
//!   `rand`, `rand_core`, `rand_chacha`, `zeroize`, `subtle`
//!
//! **NEVER imports:**
//! - `handshake` (Layer 2) — the Noise transcript is built on primitives
//! - `header`, `blockstream`, `hide` (Layer 3) — wire framing is built on
//!   primitives
//! - `keystore` (Layer 4) — identity/ring management depends on primitives,
//!   not vice versa
//! - `io` — I/O adapters are the highest layer

pub mod aead;
pub mod dh;
pub mod elligator;
pub mod hash;
pub mod kdf;
pub mod rng;
pub mod stream;

pub use aead::{aead_open_multi, aead_seal_multi};
pub use dh::{dh_shared, sign, verify, DhKeyPair, SigningKeyPair};
pub use hash::hash_long;
pub use kdf::kdf_password;
pub use rng::{random_bytes, KeyedRng};
pub use stream::stream_xor;

/// Length in bytes of every key, public value, and shared secret this crate
/// passes around — X25519/Ed25519 both use 32-byte encodings, and so does
/// every transport/auxiliary key derived from them.
pub const KEY_LEN: usize = 32;

/// Length in bytes of a single Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;
