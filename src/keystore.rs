//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! # Layer 5: Identity/Key store
//!
//! Long-lived identity records (§4.6): a 32-byte public/secret pair, a
//! human name and optional alias, a creation timestamp, a master/work
//! flag, a self-signature, and zero or more third-party certifications.
//! The public header ([`crate::header::public`]) consumes these records'
//! public halves as recipients; this module never reaches back into
//! `header` or `blockstream` except to wrap a ring file in an encrypted
//! stream when its name ends in `.cha`.
//!
//! ## Layer Contract
//!
//! **CAN import:** `primitives`, `header` (only for `.cha`-wrapped ring
//! files), `blockstream` (ditto), `io`, `error`, `secret`.
//! **NEVER imports:** `handshake`, `hide` — neither is a dependency of
//! identity management.

use std::io::{Read, Seek, Write};

use tracing::{debug, instrument, warn};

use crate::blockstream::BlockStream;
use crate::error::KeyStoreError;
use crate::header::{read_password_header, write_password_header};
use crate::primitives::dh::{sign, verify, SigningKeyPair};
use crate::primitives::hash::hash64;
use crate::primitives::rng::KeyedRng;
use crate::secret::Secret;

/// Domain separator mixed into every self-signature and certification
/// (§6): `"Key signature prefix"`.
pub const KEY_SIG_DOMAIN: &[u8] = b"Key signature prefix";

/// Domain separator for the whole-file detached-signature primitive (§6:
/// `"Amber signature prefix"`). That primitive is an external collaborator
/// of this crate (§1) — nothing here signs under it — but the constant
/// lives next to [`KEY_SIG_DOMAIN`] so a signing layer built on top of this
/// crate doesn't have to guess the exact byte string.
pub const DOC_SIG_DOMAIN: &[u8] = b"Amber signature prefix";

/// The seam a protocol-buffer-style record serializer (an external
/// collaborator, §1) would implement in place of this module's built-in
/// tag-length-value codec: anything that can be written to, or read from,
/// sequentially. Mirrors [`crate::io::BlockSink`]/[`crate::io::BlockSource`]'s
/// marker-trait shape, minus the `Seek` bound the key store's linear record
/// stream never needs.
pub trait RecordSink: std::io::Write {}
impl<T: std::io::Write> RecordSink for T {}

/// See [`RecordSink`].
pub trait RecordSource: std::io::Read {}
impl<T: std::io::Read> RecordSource for T {}

/// A signature over another key's canonical hash, by a different key.
#[derive(Clone, Debug)]
pub struct Certification {
    pub signer_pub: [u8; 32],
    pub signature: [u8; 64],
}

/// A long-lived identity record (§3).
#[derive(Clone)]
pub struct IdentityKey {
    pub public: [u8; 32],
    secret: Option<Secret<[u8; 32]>>,
    pub name: String,
    pub alias: Option<String>,
    pub creation_time: u64,
    pub is_master: bool,
    pub self_signature: [u8; 64],
    pub certifications: Vec<Certification>,
}

/// The canonical hash a self-signature and every certification sign over:
/// `H = hash_64(pub ‖ u64_le(len(name)) ‖ name ‖ u64_le(creation_time))`.
pub fn canonical_hash(public: &[u8; 32], name: &str, creation_time: u64) -> [u8; 64] {
    let name_bytes = name.as_bytes();
    hash64(&[
        public,
        &(name_bytes.len() as u64).to_le_bytes(),
        name_bytes,
        &creation_time.to_le_bytes(),
    ])
}

impl IdentityKey {
    /// Generate a fresh identity key (master or work — the cryptographic
    /// material is identical, only `is_master` differs) and immediately
    /// self-sign it. `creation_time` is caller-supplied (typically a Unix
    /// timestamp) so callers control reproducibility in tests without this
    /// module depending on wall-clock time.
    #[instrument(level = "debug", skip_all, fields(name = %name, is_master))]
    pub fn generate(name: impl Into<String>, alias: Option<String>, creation_time: u64, is_master: bool) -> Self {
        let name = name.into();
        let mut rng = KeyedRng::new(name.as_bytes());
        let seed = rng.next32();
        let signing = SigningKeyPair::from_seed(seed);
        let h = canonical_hash(&signing.public, &name, creation_time);
        let self_signature = sign(KEY_SIG_DOMAIN, &h, signing.secret.expose_secret());
        debug!(public = ?signing.public, "generated identity key");
        IdentityKey {
            public: signing.public,
            secret: Some(signing.secret),
            name,
            alias,
            creation_time,
            is_master,
            self_signature,
            certifications: Vec::new(),
        }
    }

    pub fn generate_master(name: impl Into<String>, alias: Option<String>, creation_time: u64) -> Self {
        Self::generate(name, alias, creation_time, true)
    }

    pub fn generate_work(name: impl Into<String>, alias: Option<String>, creation_time: u64) -> Self {
        Self::generate(name, alias, creation_time, false)
    }

    /// Whether this record holds the secret half — imported public-only
    /// records (e.g. a correspondent's recipient key) do not.
    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn secret(&self) -> Option<&Secret<[u8; 32]>> {
        self.secret.as_ref()
    }

    /// This key's own canonical hash under its *current* name/timestamp.
    pub fn hash(&self) -> [u8; 64] {
        canonical_hash(&self.public, &self.name, self.creation_time)
    }

    /// Verify the self-signature; a failure means the whole record is
    /// rejected on load (§4.6).
    pub fn verify_self(&self) -> Result<(), KeyStoreError> {
        verify(KEY_SIG_DOMAIN, &self.hash(), &self.self_signature, &self.public)
            .map_err(|_| KeyStoreError::KeyInvalid)
    }

    /// Re-sign after a rename/realias, since the canonical hash is bound
    /// to `name` (but not `alias`). Requires the secret half.
    fn resign(&mut self) -> Result<(), KeyStoreError> {
        let secret = self.secret.as_ref().ok_or(KeyStoreError::KeyInvalid)?;
        let h = self.hash();
        self.self_signature = sign(KEY_SIG_DOMAIN, &h, secret.expose_secret());
        // A rename invalidates every certification, which signed the old
        // name's hash; they are dropped rather than silently kept invalid.
        self.certifications.clear();
        Ok(())
    }

    pub fn rename(&mut self, new_name: impl Into<String>) -> Result<(), KeyStoreError> {
        self.name = new_name.into();
        self.resign()
    }

    pub fn set_alias(&mut self, alias: Option<String>) {
        self.alias = alias;
    }

    /// Append `signer`'s certification of this key's current canonical
    /// hash. Requires `signer`'s secret half.
    pub fn certify(&mut self, signer: &IdentityKey) -> Result<(), KeyStoreError> {
        let secret = signer.secret.as_ref().ok_or(KeyStoreError::KeyInvalid)?;
        let h = self.hash();
        let signature = sign(KEY_SIG_DOMAIN, &h, secret.expose_secret());
        self.certifications.retain(|c| c.signer_pub != signer.public);
        self.certifications.push(Certification {
            signer_pub: signer.public,
            signature,
        });
        Ok(())
    }

    /// Remove any certification by the given signer public key.
    pub fn uncertify(&mut self, signer_pub: &[u8; 32]) {
        self.certifications.retain(|c| &c.signer_pub != signer_pub);
    }

    /// Load-time behaviour: verify every certification against this key's
    /// hash, dropping (and reporting) any that fail, but keeping the key
    /// itself as long as its self-signature held (§4.6, §7).
    fn prune_bad_certifications(&mut self, warnings: &mut Vec<String>) {
        let h = self.hash();
        let key_name = self.name.clone();
        self.certifications.retain(|c| {
            let ok = verify(KEY_SIG_DOMAIN, &h, &c.signature, &c.signer_pub).is_ok();
            if !ok {
                let message = format!(
                    "dropped invalid certification on {key_name:?} by signer {:02x?}",
                    &c.signer_pub[..4]
                );
                warn!("{message}");
                warnings.push(message);
            }
            ok
        });
    }

    fn encoded_pub_hex(&self) -> String {
        to_hex(&self.public)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push(DIGITS[(b >> 4) as usize] as char);
        s.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    s
}

#[cfg(test)]
fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

/// Split `s` into maximal runs of alphanumeric characters — the "word"
/// unit the §4.6 substring-match rule operates on.
fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

fn is_whole_word_match(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    words(haystack).any(|w| w.eq_ignore_ascii_case(needle))
}

fn identifier_matches(key: &IdentityKey, identifier: &str) -> bool {
    if !identifier.is_empty() {
        let hex = key.encoded_pub_hex();
        if hex.len() >= identifier.len() && hex[..identifier.len()].eq_ignore_ascii_case(identifier) {
            return true;
        }
    }
    if is_whole_word_match(&key.name, identifier) {
        return true;
    }
    if let Some(alias) = &key.alias {
        if is_whole_word_match(alias, identifier) {
            return true;
        }
    }
    false
}

/// A key selector: a free-form identifier (matched by public-key-prefix,
/// or whole-word substring of name/alias) plus an optional "must be
/// master" filter (§4.6).
#[derive(Clone, Debug)]
pub struct Selector<'a> {
    pub identifier: &'a str,
    pub master_only: bool,
}

impl<'a> Selector<'a> {
    pub fn new(identifier: &'a str) -> Self {
        Selector {
            identifier,
            master_only: false,
        }
    }

    pub fn master_only(mut self) -> Self {
        self.master_only = true;
        self
    }
}

/// A ring of identity records (§4.6), persisted either in clear or wrapped
/// in a password-encrypted [`crate::blockstream::BlockStream`] when its
/// file name ends in `.cha` (§6).
pub struct KeyRing {
    keys: Vec<IdentityKey>,
    dirty: bool,
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRing {
    pub fn new() -> Self {
        KeyRing {
            keys: Vec::new(),
            dirty: false,
        }
    }

    pub fn keys(&self) -> &[IdentityKey] {
        &self.keys
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Append an already-constructed (and self-signed) key, marking the
    /// ring dirty.
    pub fn insert(&mut self, key: IdentityKey) {
        self.keys.push(key);
        self.dirty = true;
    }

    /// Find the single "most recent" match for a selector (§4.6): if the
    /// identifier matches exactly one key, return it regardless of
    /// timestamps; otherwise the match with the greatest `creation_time`
    /// wins, and a tie at the maximum is reported as ambiguous rather than
    /// resolved arbitrarily.
    pub fn select(&self, sel: &Selector) -> Result<&IdentityKey, KeyStoreError> {
        let idx = self.select_index(sel)?;
        Ok(&self.keys[idx])
    }

    pub fn select_mut(&mut self, sel: &Selector) -> Result<&mut IdentityKey, KeyStoreError> {
        let idx = self.select_index(sel)?;
        self.dirty = true;
        Ok(&mut self.keys[idx])
    }

    fn select_index(&self, sel: &Selector) -> Result<usize, KeyStoreError> {
        let candidates: Vec<usize> = self
            .keys
            .iter()
            .enumerate()
            .filter(|(_, k)| (!sel.master_only || k.is_master) && identifier_matches(k, sel.identifier))
            .map(|(i, _)| i)
            .collect();

        match candidates.len() {
            0 => Err(KeyStoreError::NoMatch),
            1 => Ok(candidates[0]),
            _ => {
                let max_time = candidates.iter().map(|&i| self.keys[i].creation_time).max().unwrap();
                let at_max: Vec<usize> = candidates
                    .into_iter()
                    .filter(|&i| self.keys[i].creation_time == max_time)
                    .collect();
                if at_max.len() == 1 {
                    Ok(at_max[0])
                } else {
                    Err(KeyStoreError::AmbiguousMatch)
                }
            }
        }
    }

    pub fn delete(&mut self, sel: &Selector) -> Result<IdentityKey, KeyStoreError> {
        let idx = self.select_index(sel)?;
        self.dirty = true;
        Ok(self.keys.remove(idx))
    }

    /// Sign `target`'s current hash with `signer`'s secret. Both selectors
    /// are resolved against this same ring so a caller can certify one
    /// loaded key with another.
    pub fn sign(&mut self, signer: &Selector, target: &Selector) -> Result<(), KeyStoreError> {
        let signer_idx = self.select_index(signer)?;
        let target_idx = self.select_index(target)?;
        if signer_idx == target_idx {
            let h = self.keys[target_idx].hash();
            let secret = self.keys[target_idx]
                .secret
                .as_ref()
                .ok_or(KeyStoreError::KeyInvalid)?;
            let signature = sign(KEY_SIG_DOMAIN, &h, secret.expose_secret());
            let signer_pub = self.keys[target_idx].public;
            self.keys[target_idx].certifications.retain(|c| c.signer_pub != signer_pub);
            self.keys[target_idx].certifications.push(Certification { signer_pub, signature });
        } else {
            let signer_key = self.keys[signer_idx].clone();
            self.keys[target_idx].certify(&signer_key)?;
        }
        self.dirty = true;
        Ok(())
    }

    pub fn unsign(&mut self, target: &Selector, signer_pub: &[u8; 32]) -> Result<(), KeyStoreError> {
        let idx = self.select_index(target)?;
        self.keys[idx].uncertify(signer_pub);
        self.dirty = true;
        Ok(())
    }

    /// Merge `incoming` records into this ring (§9 open question on import
    /// uniqueness): a key whose public value is not yet present is
    /// appended wholesale; a key that already exists has its
    /// certifications merged by signer-pub, first-seen signature winning
    /// on a conflict, without touching anything else about the existing
    /// record.
    #[instrument(level = "debug", skip_all, fields(incoming = incoming.len()))]
    pub fn merge(&mut self, incoming: Vec<IdentityKey>) {
        for new_key in incoming {
            if let Some(existing) = self.keys.iter_mut().find(|k| k.public == new_key.public) {
                for cert in new_key.certifications {
                    let already_seen = existing.certifications.iter().any(|c| c.signer_pub == cert.signer_pub);
                    if !already_seen {
                        existing.certifications.push(cert);
                    }
                }
            } else {
                self.keys.push(new_key);
            }
        }
        self.dirty = true;
    }

    // -- Serialization (§6: tag-length-value records) --------------------

    const TAG_PUB: u8 = 1;
    const TAG_SEC: u8 = 2;
    const TAG_NAME: u8 = 3;
    const TAG_ALIAS: u8 = 4;
    const TAG_CREATED: u8 = 5;
    const TAG_MASTER: u8 = 6;
    const TAG_SELFSIG: u8 = 7;
    const TAG_CERT: u8 = 8;
    const TAG_RECORD_END: u8 = 0xff;

    fn write_field(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
        out.push(tag);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
    }

    /// Serialize every record as a concatenation of tagged fields (§6);
    /// this is the byte sink both a plain ring file and a `.cha`-wrapped
    /// one write their payload through.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for key in &self.keys {
            Self::write_field(&mut out, Self::TAG_PUB, &key.public);
            if let Some(secret) = &key.secret {
                Self::write_field(&mut out, Self::TAG_SEC, secret.expose_secret());
            }
            Self::write_field(&mut out, Self::TAG_NAME, key.name.as_bytes());
            if let Some(alias) = &key.alias {
                Self::write_field(&mut out, Self::TAG_ALIAS, alias.as_bytes());
            }
            Self::write_field(&mut out, Self::TAG_CREATED, &key.creation_time.to_le_bytes());
            Self::write_field(&mut out, Self::TAG_MASTER, &[key.is_master as u8]);
            Self::write_field(&mut out, Self::TAG_SELFSIG, &key.self_signature);
            for cert in &key.certifications {
                let mut v = Vec::with_capacity(32 + 64);
                v.extend_from_slice(&cert.signer_pub);
                v.extend_from_slice(&cert.signature);
                Self::write_field(&mut out, Self::TAG_CERT, &v);
            }
            out.push(Self::TAG_RECORD_END);
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        out
    }

    /// Parse a byte buffer produced by [`Self::serialize`]. A record whose
    /// self-signature fails is dropped wholesale (and reported); a record
    /// whose individual certification fails is kept with just that
    /// certification dropped (§4.6, §7).
    #[instrument(level = "debug", skip_all, fields(len = bytes.len()))]
    pub fn parse(bytes: &[u8]) -> Result<(Vec<IdentityKey>, Vec<String>), KeyStoreError> {
        let mut pos = 0usize;
        let mut keys = Vec::new();
        let mut warnings = Vec::new();

        while pos < bytes.len() {
            let mut public: Option<[u8; 32]> = None;
            let mut secret: Option<[u8; 32]> = None;
            let mut name: Option<String> = None;
            let mut alias: Option<String> = None;
            let mut creation_time: Option<u64> = None;
            let mut is_master = false;
            let mut self_signature: Option<[u8; 64]> = None;
            let mut certifications = Vec::new();

            loop {
                if pos + 5 > bytes.len() {
                    return Err(KeyStoreError::RecordMalformed);
                }
                let tag = bytes[pos];
                let len = u32::from_le_bytes(bytes[pos + 1..pos + 5].try_into().unwrap()) as usize;
                pos += 5;
                if pos + len > bytes.len() {
                    return Err(KeyStoreError::RecordMalformed);
                }
                let value = &bytes[pos..pos + len];
                pos += len;

                match tag {
                    Self::TAG_PUB => {
                        public = Some(value.try_into().map_err(|_| KeyStoreError::RecordMalformed)?);
                    }
                    Self::TAG_SEC => {
                        secret = Some(value.try_into().map_err(|_| KeyStoreError::RecordMalformed)?);
                    }
                    Self::TAG_NAME => {
                        name = Some(String::from_utf8(value.to_vec()).map_err(|_| KeyStoreError::RecordMalformed)?);
                    }
                    Self::TAG_ALIAS => {
                        alias = Some(String::from_utf8(value.to_vec()).map_err(|_| KeyStoreError::RecordMalformed)?);
                    }
                    Self::TAG_CREATED => {
                        creation_time = Some(u64::from_le_bytes(
                            value.try_into().map_err(|_| KeyStoreError::RecordMalformed)?,
                        ));
                    }
                    Self::TAG_MASTER => {
                        is_master = value.first().copied().unwrap_or(0) != 0;
                    }
                    Self::TAG_SELFSIG => {
                        self_signature = Some(value.try_into().map_err(|_| KeyStoreError::RecordMalformed)?);
                    }
                    Self::TAG_CERT => {
                        if value.len() != 96 {
                            return Err(KeyStoreError::RecordMalformed);
                        }
                        let mut signer_pub = [0u8; 32];
                        let mut signature = [0u8; 64];
                        signer_pub.copy_from_slice(&value[..32]);
                        signature.copy_from_slice(&value[32..]);
                        certifications.push(Certification { signer_pub, signature });
                    }
                    Self::TAG_RECORD_END => break,
                    _ => return Err(KeyStoreError::RecordMalformed),
                }
            }

            let public = public.ok_or(KeyStoreError::RecordMalformed)?;
            let name = name.ok_or(KeyStoreError::RecordMalformed)?;
            let creation_time = creation_time.ok_or(KeyStoreError::RecordMalformed)?;
            let self_signature = self_signature.ok_or(KeyStoreError::RecordMalformed)?;

            let mut key = IdentityKey {
                public,
                secret: secret.map(Secret::new),
                name,
                alias,
                creation_time,
                is_master,
                self_signature,
                certifications,
            };

            if key.verify_self().is_err() {
                warnings.push(format!("rejected key {} (self-signature invalid)", key.encoded_pub_hex()));
                continue;
            }
            key.prune_bad_certifications(&mut warnings);
            keys.push(key);
        }

        Ok((keys, warnings))
    }

    /// Load a ring from an already-decrypted (or never-encrypted) byte
    /// buffer, dropping records that fail self-signature verification and
    /// reporting them (and any pruned certifications) via the returned
    /// warnings, per §4.6's load-is-best-effort policy.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, Vec<String>), KeyStoreError> {
        let (keys, warnings) = Self::parse(bytes)?;
        Ok((
            KeyRing {
                keys,
                dirty: false,
            },
            warnings,
        ))
    }

    /// Read a plain (unencrypted) ring file.
    pub fn load_plain<R: RecordSource>(mut source: R) -> Result<(Self, Vec<String>), KeyStoreError> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Write a plain (unencrypted) ring file and clear the dirty flag.
    pub fn save_plain<W: RecordSink>(&mut self, mut sink: W) -> Result<(), KeyStoreError> {
        sink.write_all(&self.serialize())?;
        self.dirty = false;
        Ok(())
    }

    /// Read a ring whose file name ends in `.cha` (§6): the serialized
    /// records are the plaintext payload of a password-encrypted
    /// [`BlockStream`].
    #[instrument(level = "debug", skip(io, password))]
    pub fn load_encrypted<S: Read + Write + Seek>(
        mut io: S,
        password: &[u8],
        shifts_max: u8,
    ) -> Result<(Self, Vec<String>), KeyStoreError> {
        let header = read_password_header(&mut io, password, shifts_max)?;
        let body_start = io.stream_position()?;
        let mut stream = BlockStream::open(io, &header, body_start);
        let mut plaintext = Vec::new();
        loop {
            let chunk = stream.read(stream.payload_cap())?;
            if chunk.is_empty() && stream.eof() {
                break;
            }
            plaintext.extend_from_slice(&chunk);
            if stream.eof() {
                break;
            }
        }
        Self::from_bytes(&plaintext)
    }

    /// Write a ring encrypted under `password` (`.cha` convention) and
    /// clear the dirty flag.
    #[instrument(level = "debug", skip(self, io, password))]
    pub fn save_encrypted<S: Read + Write + Seek>(
        &mut self,
        mut io: S,
        password: &[u8],
        shifts: u8,
    ) -> Result<(), KeyStoreError> {
        let header = write_password_header(&mut io, password, None, None, shifts)?;
        let body_start = io.stream_position()?;
        let mut stream = BlockStream::create(io, &header, body_start);
        stream.write(&self.serialize())?;
        stream.close()?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn generated_key_self_verifies() {
        let key = IdentityKey::generate_master("alice", None, 1000);
        key.verify_self().unwrap();
    }

    #[test]
    fn rename_resigns_and_drops_certifications() {
        let mut alice = IdentityKey::generate_master("alice", None, 1000);
        let bob = IdentityKey::generate_master("bob", None, 1000);
        alice.certify(&bob).unwrap();
        assert_eq!(alice.certifications.len(), 1);
        alice.rename("alice2").unwrap();
        alice.verify_self().unwrap();
        assert!(alice.certifications.is_empty());
    }

    #[test]
    fn load_rejects_tampered_self_signature() {
        let mut key = IdentityKey::generate_master("carol", None, 1);
        key.self_signature[0] ^= 0xff;
        let mut ring = KeyRing::new();
        ring.insert(key);
        let bytes = ring.serialize();
        let (keys, warnings) = KeyRing::parse(&bytes).unwrap();
        assert!(keys.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn load_drops_only_bad_certification() {
        let mut key = IdentityKey::generate_master("dave", None, 1);
        let signer = IdentityKey::generate_master("erin", None, 1);
        key.certify(&signer).unwrap();
        key.certifications[0].signature[0] ^= 0xff;

        let mut ring = KeyRing::new();
        ring.insert(key);
        let bytes = ring.serialize();
        let (keys, warnings) = KeyRing::parse(&bytes).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].certifications.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn select_by_pub_prefix() {
        let key = IdentityKey::generate_master("frank", None, 1);
        let mut ring = KeyRing::new();
        let prefix = to_hex(&key.public)[..8].to_string();
        ring.insert(key);
        let found = ring.select(&Selector::new(&prefix)).unwrap();
        assert_eq!(found.name, "frank");
    }

    #[test]
    fn select_by_name_is_whole_word() {
        let key = IdentityKey::generate_master("grace hopper", None, 1);
        let mut ring = KeyRing::new();
        ring.insert(key);
        assert!(ring.select(&Selector::new("grace")).is_ok());
        assert!(ring.select(&Selector::new("hopper")).is_ok());
        assert!(ring.select(&Selector::new("grac")).is_err());
    }

    #[test]
    fn select_most_recent_on_multiple_matches() {
        let mut ring = KeyRing::new();
        ring.insert(IdentityKey::generate_master("shared", None, 10));
        ring.insert(IdentityKey::generate_master("shared", None, 20));
        let found = ring.select(&Selector::new("shared")).unwrap();
        assert_eq!(found.creation_time, 20);
    }

    #[test]
    fn select_tie_at_max_is_ambiguous() {
        let mut ring = KeyRing::new();
        ring.insert(IdentityKey::generate_master("tie", None, 10));
        ring.insert(IdentityKey::generate_master("tie", None, 10));
        let err = ring.select(&Selector::new("tie")).unwrap_err();
        assert!(matches!(err, KeyStoreError::AmbiguousMatch));
    }

    #[test]
    fn select_master_only_filter() {
        let mut ring = KeyRing::new();
        ring.insert(IdentityKey::generate_work("mixed", None, 10));
        ring.insert(IdentityKey::generate_master("mixed", None, 5));
        let found = ring.select(&Selector::new("mixed").master_only()).unwrap();
        assert!(found.is_master);
        assert_eq!(found.creation_time, 5);
    }

    #[test]
    fn select_no_match() {
        let ring = KeyRing::new();
        let err = ring.select(&Selector::new("nobody")).unwrap_err();
        assert!(matches!(err, KeyStoreError::NoMatch));
    }

    #[test]
    fn merge_dedups_certifications_first_seen_wins() {
        let mut base_ring = KeyRing::new();
        let target = IdentityKey::generate_master("target", None, 1);
        let public = target.public;
        base_ring.insert(target);

        let signer = IdentityKey::generate_master("signer", None, 1);

        let mut copy_a = base_ring.keys()[0].clone();
        copy_a.certify(&signer).unwrap();
        let first_sig = copy_a.certifications[0].signature;

        let mut copy_b = base_ring.keys()[0].clone();
        // A conflicting (different) signature from the same signer.
        copy_b.certifications.push(Certification {
            signer_pub: signer.public,
            signature: [0xAB; 64],
        });

        base_ring.merge(vec![copy_a]);
        base_ring.merge(vec![copy_b]);

        let merged = base_ring.select(&Selector::new(&to_hex(&public))).unwrap();
        assert_eq!(merged.certifications.len(), 1);
        assert_eq!(merged.certifications[0].signature, first_sig);
    }

    #[test]
    fn merge_appends_unknown_key() {
        let mut ring = KeyRing::new();
        ring.insert(IdentityKey::generate_master("existing", None, 1));
        ring.merge(vec![IdentityKey::generate_master("new", None, 2)]);
        assert_eq!(ring.keys().len(), 2);
    }

    #[test]
    fn plain_round_trip() {
        let mut ring = KeyRing::new();
        ring.insert(IdentityKey::generate_master("round", None, 42));
        let mut buf = Vec::new();
        ring.save_plain(&mut buf).unwrap();
        assert!(!ring.is_dirty());

        let (loaded, warnings) = KeyRing::load_plain(Cursor::new(buf)).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded.keys().len(), 1);
        assert_eq!(loaded.keys()[0].name, "round");
    }

    #[test]
    fn encrypted_round_trip() {
        let mut ring = KeyRing::new();
        ring.insert(IdentityKey::generate_master("secret-ring", None, 1));
        ring.insert(IdentityKey::generate_work("work-key", Some("w".into()), 2));

        let mut buf = Cursor::new(Vec::new());
        ring.save_encrypted(&mut buf, b"ring password", 4).unwrap();
        assert!(!ring.is_dirty());

        buf.set_position(0);
        let (loaded, warnings) = KeyRing::load_encrypted(buf, b"ring password", 20).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded.keys().len(), 2);
        assert_eq!(loaded.keys()[0].name, "secret-ring");
        assert_eq!(loaded.keys()[1].name, "work-key");
    }

    #[test]
    fn encrypted_wrong_password_fails() {
        let mut ring = KeyRing::new();
        ring.insert(IdentityKey::generate_master("k", None, 1));
        let mut buf = Cursor::new(Vec::new());
        ring.save_encrypted(&mut buf, b"right", 4).unwrap();
        buf.set_position(0);
        let err = KeyRing::load_encrypted(buf, b"wrong", 6).unwrap_err();
        assert!(matches!(err, KeyStoreError::Header(_)));
    }

    #[test]
    fn hex_round_trip() {
        let bytes = [1u8, 2, 3, 0xff, 0xab];
        let hex = to_hex(&bytes);
        assert_eq!(from_hex(&hex).unwrap(), bytes);
    }
}
