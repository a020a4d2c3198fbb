//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! End-to-end scenarios spanning header + block-stream + hide/reveal +
//! key-store layers together, as a single caller would actually drive them.
//! Per-module unit tests already cover each layer in isolation; these only
//! assert the seams between layers behave as the whole system promises.

use std::cell::RefCell;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use veilstream_core::blockstream::BlockStream;
use veilstream_core::header::{read_password_header, read_public_header, write_password_header, write_public_header};
use veilstream_core::hide::{derive_inner_key_password, reveal, write_hidden};
use veilstream_core::keystore::{IdentityKey, KeyRing, Selector};
use veilstream_core::primitives::dh::DhKeyPair;

/// A `Read + Write + Seek` handle over a `Vec<u8>` shared with the test, so
/// a stream that's done writing can be inspected (or reopened for reading)
/// without needing to reach into `BlockStream`'s private I/O handle.
#[derive(Clone)]
struct SharedCursor(Rc<RefCell<Cursor<Vec<u8>>>>);

impl SharedCursor {
    fn new() -> Self {
        SharedCursor(Rc::new(RefCell::new(Cursor::new(Vec::new()))))
    }

    fn rewound(&self) -> Self {
        self.0.borrow_mut().set_position(0);
        self.clone()
    }
}

impl Read for SharedCursor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().read(buf)
    }
}
impl Write for SharedCursor {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.borrow_mut().flush()
    }
}
impl Seek for SharedCursor {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.borrow_mut().seek(pos)
    }
}

fn deterministic_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Scenario 1: password round trip, small, single block.
#[test]
fn password_round_trip_small() {
    let io = SharedCursor::new();
    let mut header_sink = io.clone();
    let header = write_password_header(&mut header_sink, b"kkti", Some(4096), Some(128), 4).unwrap();
    let header_len = io.0.borrow().position();
    assert_eq!(header_len, 32 + 24);

    let mut stream = BlockStream::create(io.clone(), &header, header_len);
    stream.write(b"hello world\n").unwrap();
    stream.close().unwrap();
    drop(stream);

    let mut reader_io = io.rewound();
    let read_header = read_password_header(&mut reader_io, b"kkti", 20).unwrap();
    let body_start = reader_io.0.borrow().position();
    let mut reader = BlockStream::open(reader_io, &read_header, body_start);
    let out = reader.read(12).unwrap();
    assert_eq!(out, b"hello world\n");
    assert!(reader.eof() || reader.read(1).unwrap().is_empty());
}

/// Scenario 2: password round trip, multi-block, 10,000 bytes through a
/// shape that forces exactly 6 on-disk blocks (including the terminal one).
#[test]
fn password_round_trip_multi_block() {
    let bs = 2048u32;
    let bf = 64u32;
    let plaintext = deterministic_bytes(10_000, 7);

    let io = SharedCursor::new();
    let mut header_sink = io.clone();
    let header = write_password_header(&mut header_sink, b"multiblock password", Some(bs), Some(bf), 4).unwrap();
    let header_len = io.0.borrow().position();

    let mut stream = BlockStream::create(io.clone(), &header, header_len);
    stream.write(&plaintext).unwrap();
    stream.close().unwrap();
    drop(stream);

    let total_len = io.0.borrow().get_ref().len() as u64;
    let body_len = total_len - header_len;
    let physical_len = bs as u64 + 16;
    let n_blocks = body_len.div_ceil(physical_len);
    assert_eq!(n_blocks, 6, "10000 bytes at payload cap {} should need 6 blocks", bs - bf);

    let mut reader_io = io.rewound();
    let read_header = read_password_header(&mut reader_io, b"multiblock password", 20).unwrap();
    let body_start = reader_io.0.borrow().position();
    let mut reader = BlockStream::open(reader_io, &read_header, body_start);
    let out = reader.read(plaintext.len()).unwrap();
    assert_eq!(out, plaintext);
    assert!(reader.eof() || reader.read(1).unwrap().is_empty());
}

/// Scenario 3: random-access writes at random offsets reproduce a plaintext
/// reference when the whole ciphertext is read back sequentially.
#[test]
fn random_access_write_matches_reference() {
    let bs = 512u32;
    let bf = 32u32;
    let io = SharedCursor::new();
    let mut header_sink = io.clone();
    let header = write_password_header(&mut header_sink, b"random access", Some(bs), Some(bf), 2).unwrap();
    let header_len = io.0.borrow().position();

    let mut stream = BlockStream::create(io.clone(), &header, header_len);
    let mut reference: Vec<u8> = Vec::new();

    // A deterministic pseudo-random sequence of (offset, chunk) writes,
    // each clamped to land inside (or immediately after) the current
    // reference length, matching the spec's "random offsets <= current
    // file-size" rule.
    let mut state: u64 = 0x243F6A8885A308D3;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for round in 0..500u32 {
        let chunk_len = 1 + (next() % 37) as usize;
        let chunk = deterministic_bytes(chunk_len, round as u8);
        let max_offset = reference.len();
        let offset = if max_offset == 0 { 0 } else { (next() as usize) % (max_offset + 1) };

        stream.seek_to_byte_offset(offset as u64).unwrap();
        stream.write(&chunk).unwrap();

        let end = offset + chunk.len();
        if end > reference.len() {
            reference.resize(end, 0);
        }
        reference[offset..end].copy_from_slice(&chunk);
    }

    stream.close().unwrap();
    drop(stream);

    let mut reader_io = io.rewound();
    let read_header = read_password_header(&mut reader_io, b"random access", 20).unwrap();
    let body_start = reader_io.0.borrow().position();
    let mut reader = BlockStream::open(reader_io, &read_header, body_start);
    let out = reader.read(reference.len()).unwrap();
    assert_eq!(out, reference);
}

/// Scenario 4: two-recipient public envelope. Both recipients recover the
/// same plaintext and agree on the reported sender; an unrelated key is
/// rejected as not-a-recipient.
#[test]
fn public_two_recipient_envelope() {
    let sender = DhKeyPair::from_seed([9u8; 32]);
    let recipient_a = DhKeyPair::from_seed([10u8; 32]);
    let recipient_b = DhKeyPair::from_seed([11u8; 32]);
    let stranger = DhKeyPair::from_seed([12u8; 32]);

    let plaintext = deterministic_bytes(5000, 3);

    let io = SharedCursor::new();
    let mut header_sink = io.clone();
    let written = write_public_header(
        &mut header_sink,
        Some(1024),
        Some(64),
        &sender,
        &[recipient_a.public, recipient_b.public],
        None,
    )
    .unwrap();
    let header_len = io.0.borrow().position();

    let mut stream = BlockStream::create(io.clone(), &written, header_len);
    stream.write(&plaintext).unwrap();
    stream.close().unwrap();
    drop(stream);

    for recipient in [&recipient_a, &recipient_b] {
        let mut reader_io = io.rewound();
        let opened = read_public_header(&mut reader_io, recipient).unwrap();
        assert_eq!(opened.sender, sender.public);
        let body_start = reader_io.0.borrow().position();
        let mut reader = BlockStream::open(reader_io, &opened.header, body_start);
        let out = reader.read(plaintext.len()).unwrap();
        assert_eq!(out, plaintext);
    }

    let mut reader_io = io.rewound();
    let err = read_public_header(&mut reader_io, &stranger).unwrap_err();
    assert!(matches!(err, veilstream_core::HeaderError::NotARecipient));
}

/// Scenario 5: password hide/reveal. Opening the outer layer with only the
/// outer password yields the bogus cover; revealing with both passwords
/// yields the exact secret; the wrong inner password is rejected.
#[test]
fn hide_reveal_password_layering() {
    let bogus = deterministic_bytes(1 << 20, 1); // 1 MiB cover
    let secret = deterministic_bytes(30 * 1024, 2); // 30 KiB secret

    let io = SharedCursor::new();
    let mut header_sink = io.clone();
    let outer_header = write_password_header(&mut header_sink, b"outer", Some(8192), Some(128), 4).unwrap();
    let header_len = io.0.borrow().position();
    let inner_key = derive_inner_key_password(&outer_header, b"inner", 4).unwrap();

    let mut writer_io = io.clone();
    write_hidden(&mut writer_io, &outer_header, header_len, &bogus, inner_key, &secret).unwrap();

    // Open outer-only: a party with just the cover password sees the bogus
    // payload and nothing about the secret.
    let mut outer_reader_io = io.rewound();
    let outer_read_header = read_password_header(&mut outer_reader_io, b"outer", 20).unwrap();
    let body_start = outer_reader_io.0.borrow().position();
    let mut outer_reader = BlockStream::open(outer_reader_io, &outer_read_header, body_start);
    let recovered_bogus = outer_reader.read(bogus.len()).unwrap();
    assert_eq!(recovered_bogus, bogus);
    drop(outer_reader);

    // Reveal with both passwords recovers the secret exactly.
    let mut reveal_io = io.rewound();
    let reveal_header = read_password_header(&mut reveal_io, b"outer", 20).unwrap();
    let body_start = reveal_io.0.borrow().position();
    let right_inner_key = derive_inner_key_password(&reveal_header, b"inner", 4).unwrap();
    let recovered_secret = reveal(&mut reveal_io, &reveal_header, body_start, right_inner_key).unwrap();
    assert_eq!(recovered_secret, secret);

    // The wrong inner password fails closed rather than returning garbage.
    let mut wrong_io = io.rewound();
    let wrong_header = read_password_header(&mut wrong_io, b"outer", 20).unwrap();
    let body_start = wrong_io.0.borrow().position();
    let wrong_inner_key = derive_inner_key_password(&wrong_header, b"not the inner password", 4).unwrap();
    let err = reveal(&mut wrong_io, &wrong_header, body_start, wrong_inner_key).unwrap_err();
    assert!(matches!(err, veilstream_core::HideError::InnerPasswordOrNoSecret));
}

/// Generated keys self-verify, survive a plain-ring round trip, and remain
/// selectable by prefix/name after reload — the load-time contract
/// `keystore` makes to every caller of a ring file.
#[test]
fn key_ring_round_trip_and_selection() {
    let mut ring = KeyRing::new();
    ring.insert(IdentityKey::generate_master("alice", Some("a".into()), 1000));
    ring.insert(IdentityKey::generate_work("alice-laptop", None, 1001));

    let mut buf = Vec::new();
    ring.save_plain(&mut buf).unwrap();

    let (loaded, warnings) = KeyRing::load_plain(Cursor::new(buf)).unwrap();
    assert!(warnings.is_empty());
    for key in loaded.keys() {
        key.verify_self().unwrap();
    }

    let found = loaded.select(&Selector::new("alice").master_only()).unwrap();
    assert_eq!(found.name, "alice");
    let found_work = loaded.select(&Selector::new("laptop")).unwrap();
    assert_eq!(found_work.name, "alice-laptop");
}

/// A stream's encrypted ring file (`.cha` convention) round-trips through
/// the same password header + block-stream path every other encrypted
/// stream in this crate uses.
#[test]
fn encrypted_key_ring_round_trip() {
    let mut ring = KeyRing::new();
    ring.insert(IdentityKey::generate_master("ring-owner", None, 1));

    let mut buf = Cursor::new(Vec::new());
    ring.save_encrypted(&mut buf, b"ring file password", 4).unwrap();

    buf.set_position(0);
    let (loaded, warnings) = KeyRing::load_encrypted(buf, b"ring file password", 20).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(loaded.keys().len(), 1);
    assert_eq!(loaded.keys()[0].name, "ring-owner");
}
