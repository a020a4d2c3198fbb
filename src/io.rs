//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! # Byte sink/source boundary
//!
//! `blockstream` and `header` never commit to a concrete `std::fs::File`.
//! Instead they are generic over anything that implements [`Read`], [`Write`],
//! and [`Seek`] from `std::io` — a real file, a `Cursor<Vec<u8>>` in tests, or
//! a caller-supplied adapter over something else entirely (a memory-mapped
//! region, a network-backed blob store). This mirrors the teacher's
//! `io`-as-highest-layer convention (`crates/core/src/io/mod.rs`): I/O
//! adapters are supplied by the caller, not owned by the codec.
//!
//! This module intentionally holds no code of its own beyond re-exports and
//! a small convenience alias — the actual bound lives at each call site as
//! `R: Read + Seek` / `W: Write + Seek`, which is more composable than a
//! bespoke trait duplicating `std::io`'s.

/// Convenience bound for a byte source the block-stream codec can read and
/// reposition within (a file opened for reading, or an in-memory cursor).
pub trait BlockSource: std::io::Read + std::io::Seek {}
impl<T: std::io::Read + std::io::Seek> BlockSource for T {}

/// Convenience bound for a byte sink the block-stream codec can write and
/// reposition within (a file opened for read/write, or an in-memory cursor).
pub trait BlockSink: std::io::Read + std::io::Write + std::io::Seek {}
impl<T: std::io::Read + std::io::Write + std::io::Seek> BlockSink for T {}
