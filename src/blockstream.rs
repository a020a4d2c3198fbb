//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! # Layer 3: The block-stream codec
//!
//! The central subsystem of this crate (§4.4): splits a plaintext into
//! equal-sized blocks, encrypts each under a per-block nonce derived from a
//! base nonce plus the block number, attaches one authentication tag per
//! recipient, authenticates a one-byte block type as associated data, and
//! supports random-access reads, overwrites, and truncation detection.
//!
//! ## Block type without a stored tag
//!
//! Block type is never written to disk (§6): it is reconstructed from
//! physical shape alone. A block occupying the full `bs + 16*n_auth` bytes
//! is type `1` (block 0) or `2` (any other block); a shorter block is
//! always type `3`, the terminal block. This means the writer and a later
//! reader always agree on a block's type without needing to persist it —
//! the only invariant the writer must uphold is that a block is written
//! short if and only if it is meant to be the terminal one.
//!
//! ## Layer Contract
//!
//! **CAN import:** `primitives`, `header` (for [`crate::header::OpenedHeader`]),
//! `io`, `error`, `secret`.
//! **NEVER imports:** `hide`, `keystore` — those are built on this module.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{instrument, trace, warn};

use crate::error::BlockStreamError;
use crate::header::OpenedHeader;
use crate::primitives::aead::{aead_open_multi, aead_seal_multi};
use crate::primitives::rng::KeyedRng;

/// A block index may never reach this value — one past the largest index
/// whose normal and terminal nonces (`B + n` and `B + n + 2^63`) both stay
/// inside the 64-bit nonce space the stream cipher addresses.
const MAX_BLOCK_NUMBER: u64 = (1u64 << 63) - 1;
const TERMINAL_NONCE_OFFSET: u64 = 1u64 << 63;

fn read_up_to<R: Read>(io: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match io.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// A seekable, random-access authenticated block stream over any
/// `Read + Write + Seek` byte sink (a file, or an in-memory cursor in
/// tests). One instance owns exactly one stream (§5): no internal locking,
/// no shared state beyond what the caller explicitly clones.
pub struct BlockStream<S> {
    io: S,
    key_enc: [u8; 32],
    keys_auth: Vec<[u8; 32]>,
    tag_index: usize,
    n_auth: usize,
    base_nonce: u64,
    bs: u32,
    bf: u32,
    body_start: u64,

    block_number: u64,
    buf: Vec<u8>,
    loaded: bool,
    dirty: bool,
    /// Bytes of *payload* (excluding filler) currently valid in `buf` for
    /// the loaded block; `< payload_cap()` iff this block would currently
    /// serialize as the terminal block.
    payload_len: usize,
    intra_offset: usize,
    current_is_terminal: bool,

    max_block_written: Option<u64>,
    last_flush_block_number: Option<u64>,
    last_flush_was_short: bool,

    eof: bool,
    closed: bool,
    rng: Option<KeyedRng>,
}

impl<S> BlockStream<S> {
    /// Plaintext payload bytes carried by one block (`bs - bf`).
    pub fn payload_cap(&self) -> usize {
        (self.bs - self.bf) as usize
    }

    /// On-disk size of a full (non-terminal) block: `bs + 16 * n_auth`.
    pub fn physical_len(&self) -> u64 {
        self.bs as u64 + 16 * self.n_auth as u64
    }

    /// `true` once a read has run past the terminal block's payload.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// `block_size`/`block_filler` this stream was opened with.
    pub fn shape(&self) -> (u32, u32) {
        (self.bs, self.bf)
    }

    fn nonce_for(&self, block_number: u64, terminal: bool) -> u64 {
        let n = self.base_nonce.wrapping_add(block_number);
        if terminal {
            n.wrapping_add(TERMINAL_NONCE_OFFSET)
        } else {
            n
        }
    }

    fn ad_for(block_number: u64, terminal: bool) -> [u8; 1] {
        [if terminal {
            3
        } else if block_number == 0 {
            1
        } else {
            2
        }]
    }

    fn check_block_number(n: u64) -> Result<(), BlockStreamError> {
        if n >= MAX_BLOCK_NUMBER {
            return Err(BlockStreamError::NonceSpaceExhausted);
        }
        Ok(())
    }
}

impl<S: Read + Write + Seek> BlockStream<S> {
    /// Open `io` (assumed empty/positioned at the start of the body) for
    /// writing, using the key material and block shape a header produced.
    pub fn create(io: S, header: &OpenedHeader, body_start: u64) -> Self {
        BlockStream {
            io,
            key_enc: header.key,
            keys_auth: header.keys_auth.clone(),
            tag_index: header.tag_index,
            n_auth: header.n_recipients,
            base_nonce: header.base_nonce,
            bs: header.bs,
            bf: header.bf,
            body_start,
            block_number: 0,
            buf: Vec::new(),
            loaded: false,
            dirty: false,
            payload_len: 0,
            intra_offset: 0,
            current_is_terminal: false,
            max_block_written: None,
            last_flush_block_number: None,
            last_flush_was_short: false,
            eof: false,
            closed: false,
            rng: Some(KeyedRng::new(&header.key)),
        }
    }

    /// Open `io` (positioned so that the body starts at `body_start`) for
    /// reading. A reader only ever holds one auxiliary key, so `keys_auth`
    /// and `tag_index` here are the single-element/offset shape a header's
    /// `read_*` function hands back.
    pub fn open(io: S, header: &OpenedHeader, body_start: u64) -> Self {
        BlockStream {
            io,
            key_enc: header.key,
            keys_auth: header.keys_auth.clone(),
            tag_index: header.tag_index,
            n_auth: header.n_recipients,
            base_nonce: header.base_nonce,
            bs: header.bs,
            bf: header.bf,
            body_start,
            block_number: 0,
            buf: Vec::new(),
            loaded: false,
            dirty: false,
            payload_len: 0,
            intra_offset: 0,
            current_is_terminal: false,
            max_block_written: None,
            last_flush_block_number: None,
            last_flush_was_short: false,
            eof: false,
            closed: false,
            rng: None,
        }
    }

    fn refill_filler(&mut self) {
        let bf = self.bf as usize;
        if bf == 0 {
            return;
        }
        match &mut self.rng {
            Some(rng) => rng.fill(&mut self.buf[..bf]),
            None => unreachable!("refill_filler only called while writing"),
        }
    }

    /// Load the block at `self.block_number` into `buf`, either by reading
    /// and decrypting it back from disk (it was written in a prior flush of
    /// this session) or, for a writer positioned past everything written so
    /// far, starting a fresh block with new filler.
    fn load_current_block(&mut self, for_write: bool) -> Result<(), BlockStreamError> {
        if self.loaded {
            return Ok(());
        }
        // `max_block_written` is writer-side bookkeeping (populated by
        // `flush_current`); a reader never sets it, so only a writer can use
        // it to decide "this position is past everything on disk, start a
        // fresh block" rather than attempting — and failing — a real read.
        let known_fresh =
            for_write && !matches!(self.max_block_written, Some(m) if self.block_number <= m);
        if known_fresh {
            self.buf = vec![0u8; self.bs as usize];
            self.refill_filler();
            self.payload_len = 0;
            self.current_is_terminal = false;
            self.intra_offset = 0;
            self.dirty = false;
            self.loaded = true;
            return Ok(());
        }

        let offset = self.body_start + self.block_number * self.physical_len();
        self.io.seek(SeekFrom::Start(offset))?;
        let want = self.physical_len() as usize;
        let mut raw = vec![0u8; want];
        let n = read_up_to(&mut self.io, &mut raw)?;
        let tag_region = 16 * self.n_auth;

        let (ct_len, terminal) = if n == want {
            (self.bs as usize, false)
        } else if n >= self.bf as usize + tag_region && n < want {
            (n - tag_region, true)
        } else {
            return Err(BlockStreamError::StreamTruncated);
        };

        let ct = &raw[..ct_len];
        let tags_raw = &raw[ct_len..ct_len + tag_region];
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&tags_raw[self.tag_index * 16..self.tag_index * 16 + 16]);

        let nonce = self.nonce_for(self.block_number, terminal);
        let ad = Self::ad_for(self.block_number, terminal);
        let pt = aead_open_multi(ct, &ad, &self.key_enc, &self.keys_auth[0], &tag, nonce)
            .map_err(|_| BlockStreamError::BodyAuth)?;

        self.buf = vec![0u8; self.bs as usize];
        self.buf[..pt.len()].copy_from_slice(&pt);
        self.payload_len = pt.len().saturating_sub(self.bf as usize);
        self.current_is_terminal = terminal;
        self.intra_offset = 0;
        self.dirty = false;
        self.loaded = true;
        Ok(())
    }

    /// Seal and write the currently loaded block at its position. Whether
    /// it serializes as the terminal block follows purely from whether
    /// `payload_len < payload_cap()` at this moment (see the module doc).
    fn flush_current(&mut self) -> Result<(), BlockStreamError> {
        debug_assert!(self.loaded);
        Self::check_block_number(self.block_number)?;
        let cap = self.payload_cap();
        let ct_len = self.bf as usize + self.payload_len;
        let terminal = self.payload_len < cap;
        let ad = Self::ad_for(self.block_number, terminal);
        let nonce = self.nonce_for(self.block_number, terminal);
        let (ct, tags) =
            aead_seal_multi(&self.buf[..ct_len], &ad, &self.key_enc, &self.keys_auth, nonce);

        let offset = self.body_start + self.block_number * self.physical_len();
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.write_all(&ct)?;
        for tag in &tags {
            self.io.write_all(tag)?;
        }
        trace!(block = self.block_number, terminal, ct_len, "flushed block");

        self.max_block_written = Some(match self.max_block_written {
            Some(m) => m.max(self.block_number),
            None => self.block_number,
        });
        self.last_flush_block_number = Some(self.block_number);
        self.last_flush_was_short = terminal;
        self.current_is_terminal = terminal;
        self.dirty = false;
        Ok(())
    }

    /// Append `data` to the stream at the current write position,
    /// buffering into whole blocks and flushing each as it fills.
    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    pub fn write(&mut self, mut data: &[u8]) -> Result<(), BlockStreamError> {
        if self.closed {
            return Err(BlockStreamError::AlreadyClosed);
        }
        while !data.is_empty() {
            if !self.loaded {
                self.load_current_block(true)?;
            }
            let cap = self.payload_cap();
            let room = cap - self.intra_offset;
            let n = room.min(data.len());
            let start = self.bf as usize + self.intra_offset;
            self.buf[start..start + n].copy_from_slice(&data[..n]);
            self.intra_offset += n;
            if self.intra_offset > self.payload_len {
                self.payload_len = self.intra_offset;
            }
            self.dirty = true;
            data = &data[n..];

            if self.intra_offset == cap {
                self.flush_current()?;
                Self::check_block_number(self.block_number + 1)?;
                self.block_number += 1;
                self.loaded = false;
                self.intra_offset = 0;
            }
        }
        Ok(())
    }

    /// Read up to `want` bytes, stopping early (with [`Self::eof`] set) at
    /// the terminal block's payload boundary.
    #[instrument(level = "trace", skip(self), fields(want))]
    pub fn read(&mut self, want: usize) -> Result<Vec<u8>, BlockStreamError> {
        if self.closed {
            return Err(BlockStreamError::AlreadyClosed);
        }
        let mut out = Vec::with_capacity(want);
        while out.len() < want {
            if !self.loaded {
                self.load_current_block(false)?;
            }
            let avail = self.payload_len.saturating_sub(self.intra_offset);
            if avail == 0 {
                if self.current_is_terminal {
                    self.eof = true;
                    break;
                }
                self.advance_block_for_read()?;
                continue;
            }
            let n = avail.min(want - out.len());
            let start = self.bf as usize + self.intra_offset;
            out.extend_from_slice(&self.buf[start..start + n]);
            self.intra_offset += n;
        }
        Ok(out)
    }

    fn advance_block_for_read(&mut self) -> Result<(), BlockStreamError> {
        Self::check_block_number(self.block_number + 1)?;
        self.block_number += 1;
        self.loaded = false;
        self.intra_offset = 0;
        Ok(())
    }

    /// The block number the write/read cursor currently sits in.
    pub fn current_block_number(&self) -> u64 {
        self.block_number
    }

    /// Overwrite the filler region of the block the cursor is currently
    /// positioned in, loading (or starting fresh) that block first if
    /// needed. Used by [`crate::hide`] to carry an inner stream inside this
    /// stream's padding; not useful on its own since the filler is already
    /// authenticated as part of this block's ciphertext regardless of its
    /// content.
    pub fn write_filler_at_cursor(&mut self, filler: &[u8]) -> Result<(), BlockStreamError> {
        if self.closed {
            return Err(BlockStreamError::AlreadyClosed);
        }
        if filler.len() > self.bf as usize {
            return Err(BlockStreamError::ParamOutOfRange(format!(
                "filler of {} bytes exceeds block filler capacity {}",
                filler.len(),
                self.bf
            )));
        }
        if !self.loaded {
            self.load_current_block(true)?;
        }
        self.buf[..filler.len()].copy_from_slice(filler);
        self.dirty = true;
        Ok(())
    }

    /// Read back the filler region of the block the cursor is currently
    /// positioned in. The bytes returned are already authenticated (they
    /// are part of this block's plaintext, sealed under the same tag as
    /// the payload) even though they carry no meaning to this layer.
    pub fn filler_at_cursor(&mut self) -> Result<&[u8], BlockStreamError> {
        if self.closed {
            return Err(BlockStreamError::AlreadyClosed);
        }
        if !self.loaded {
            self.load_current_block(false)?;
        }
        Ok(&self.buf[..self.bf as usize])
    }

    /// Move the cursor to the next block without requiring the caller to
    /// know the current block's payload length, flushing first if dirty.
    pub fn advance_block(&mut self) -> Result<(), BlockStreamError> {
        if self.dirty {
            self.flush_current()?;
        }
        Self::check_block_number(self.block_number + 1)?;
        self.block_number += 1;
        self.loaded = false;
        self.intra_offset = 0;
        self.eof = false;
        Ok(())
    }

    /// Reposition to `(block_number, intra_offset)` — flushing the
    /// currently loaded block first if it has pending writes. `intra_offset`
    /// is an offset into that block's payload area (`0..=payload_cap()`).
    #[instrument(level = "debug", skip(self))]
    pub fn seek(&mut self, block_number: u64, intra_offset: usize) -> Result<(), BlockStreamError> {
        if self.closed {
            return Err(BlockStreamError::AlreadyClosed);
        }
        if intra_offset > self.payload_cap() {
            return Err(BlockStreamError::ParamOutOfRange(format!(
                "intra-block offset {intra_offset} exceeds payload capacity {}",
                self.payload_cap()
            )));
        }
        if self.loaded && block_number == self.block_number {
            self.intra_offset = intra_offset;
            self.eof = false;
            return Ok(());
        }
        if self.dirty {
            self.flush_current()?;
        }
        self.block_number = block_number;
        self.intra_offset = intra_offset;
        self.loaded = false;
        self.eof = false;
        Ok(())
    }

    /// Convenience: map a flat byte offset into the plaintext stream to a
    /// `(block_number, intra_offset)` pair and seek there.
    pub fn seek_to_byte_offset(&mut self, offset: u64) -> Result<(), BlockStreamError> {
        let cap = self.payload_cap() as u64;
        if cap == 0 {
            return Err(BlockStreamError::ParamOutOfRange(
                "block filler leaves no payload capacity".into(),
            ));
        }
        let block_number = offset / cap;
        let intra = (offset % cap) as usize;
        self.seek(block_number, intra)
    }

    /// Finish the stream: flush any pending write, then guarantee exactly
    /// one terminal block sits at the greatest block number ever written
    /// (appending an explicit empty one if the last flush happened to land
    /// exactly on a full block). Idempotent — calling this twice is a no-op
    /// the second time.
    ///
    /// Resolves the spec's open question on terminal-block selection under
    /// backward seeks: the terminal block is always the block with the
    /// greatest `block_number` ever written, recomputed here rather than
    /// inferred from the stream's *current* cursor position.
    #[instrument(level = "debug", skip(self))]
    pub fn close(&mut self) -> Result<(), BlockStreamError> {
        if self.closed {
            return Ok(());
        }
        if self.dirty {
            self.flush_current()?;
        }
        let frontier_is_short = match self.max_block_written {
            Some(m) => self.last_flush_block_number == Some(m) && self.last_flush_was_short,
            None => false,
        };
        if !frontier_is_short {
            let frontier = self.max_block_written.map(|m| m + 1).unwrap_or(0);
            Self::check_block_number(frontier)?;
            self.block_number = frontier;
            self.buf = vec![0u8; self.bs as usize];
            self.refill_filler();
            self.payload_len = 0;
            self.intra_offset = 0;
            self.loaded = true;
            self.dirty = true;
            self.flush_current()?;
        }
        self.closed = true;
        Ok(())
    }
}

/// Runs the writer's close path on drop so an abandoned stream (no explicit
/// `close()` call) still gets a terminal block — otherwise the file would
/// be unreadable (§5). A failure here cannot be reported; it is logged and
/// swallowed, which is why callers that need the error should call
/// [`BlockStream::close`] explicitly before dropping.
impl<S: Read + Write + Seek> Drop for BlockStream<S> {
    fn drop(&mut self) {
        if self.rng.is_some() && !self.closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "BlockStream dropped without a successful close; stream may be unreadable");
            }
        }
    }
}
