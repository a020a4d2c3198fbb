//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! The fixed token-sequence table for every named pattern this crate
//! supports: `N, K, X, NN, NK, NX, KN, KK, KX, XN, XK, XX, IN, IK, IX`, plus
//! an `XXfallback` variant.

use crate::error::HandshakeError;

/// One of the eight message tokens a pattern can emit, per §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    E,
    S,
    Ee,
    Es,
    Se,
    Ss,
    Psk,
    Payload,
}

/// Which side of a handshake a [`crate::handshake::HandshakeState`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// A named pattern's fixed token sequence. Cheap to copy: it only carries a
/// `&'static` reference into the fixed table below.
#[derive(Clone, Copy)]
pub struct Pattern {
    name: &'static str,
    pre_initiator_static: bool,
    pre_responder_static: bool,
    messages: &'static [(Role, &'static [Token])],
}

use Role::{Initiator as I, Responder as R};
use Token::*;

const N_MSGS: &[(Role, &[Token])] = &[(I, &[E, Es, Payload])];
const K_MSGS: &[(Role, &[Token])] = &[(I, &[E, Es, Ss, Payload])];
const X_MSGS: &[(Role, &[Token])] = &[(I, &[E, Es, S, Ss, Payload])];

const NN_MSGS: &[(Role, &[Token])] = &[(I, &[E, Payload]), (R, &[E, Ee, Payload])];
const NK_MSGS: &[(Role, &[Token])] = &[(I, &[E, Es, Payload]), (R, &[E, Ee, Payload])];
const NX_MSGS: &[(Role, &[Token])] = &[(I, &[E, Payload]), (R, &[E, Ee, S, Es, Payload])];

const KN_MSGS: &[(Role, &[Token])] = &[(I, &[E, Payload]), (R, &[E, Ee, Se, Payload])];
const KK_MSGS: &[(Role, &[Token])] = &[(I, &[E, Es, Ss, Payload]), (R, &[E, Ee, Se, Payload])];
const KX_MSGS: &[(Role, &[Token])] = &[(I, &[E, Payload]), (R, &[E, Ee, Se, S, Es, Payload])];

const XN_MSGS: &[(Role, &[Token])] = &[
    (I, &[E, Payload]),
    (R, &[E, Ee, Payload]),
    (I, &[S, Se, Payload]),
];
const XK_MSGS: &[(Role, &[Token])] = &[
    (I, &[E, Es, Payload]),
    (R, &[E, Ee, Payload]),
    (I, &[S, Se, Payload]),
];
const XX_MSGS: &[(Role, &[Token])] = &[
    (I, &[E, Payload]),
    (R, &[E, Ee, S, Es, Payload]),
    (I, &[S, Se, Payload]),
];

const IN_MSGS: &[(Role, &[Token])] = &[(I, &[E, S, Payload]), (R, &[E, Ee, Se, Payload])];
const IK_MSGS: &[(Role, &[Token])] = &[
    (I, &[E, Es, S, Ss, Payload]),
    (R, &[E, Ee, Se, Payload]),
];
const IX_MSGS: &[(Role, &[Token])] = &[(I, &[E, S, Payload]), (R, &[E, Ee, Se, S, Es, Payload])];

/// A responder-driven continuation used when a first `XX` message arrives
/// unexpectedly (Noise Pipes-style fallback): the responder re-keys using
/// the initiator's already-received ephemeral as a pre-message, then
/// finishes the remaining `XX` exchange from message 2 onward.
const XX_FALLBACK_MSGS: &[(Role, &[Token])] = &[(R, &[E, Ee, S, Es, Payload]), (I, &[S, Se, Payload])];

impl Pattern {
    /// Resolve a pattern by its spec name.
    pub fn named(name: &str) -> Result<Self, HandshakeError> {
        let (pre_i, pre_r, messages) = match name {
            "N" => (false, true, N_MSGS),
            "K" => (true, true, K_MSGS),
            "X" => (false, true, X_MSGS),
            "NN" => (false, false, NN_MSGS),
            "NK" => (false, true, NK_MSGS),
            "NX" => (false, false, NX_MSGS),
            "KN" => (true, false, KN_MSGS),
            "KK" => (true, true, KK_MSGS),
            "KX" => (true, false, KX_MSGS),
            "XN" => (false, false, XN_MSGS),
            "XK" => (false, true, XK_MSGS),
            "XX" => (false, false, XX_MSGS),
            "IN" => (false, false, IN_MSGS),
            "IK" => (false, true, IK_MSGS),
            "IX" => (false, false, IX_MSGS),
            "XXfallback" => (false, false, XX_FALLBACK_MSGS),
            other => return Err(HandshakeError::UnknownPattern(other.to_string())),
        };
        Ok(Pattern {
            name,
            pre_initiator_static: pre_i,
            pre_responder_static: pre_r,
            messages,
        })
    }

    /// `(initiator's static known to responder in advance, responder's
    /// static known to initiator in advance)`.
    pub fn pre_known_static(&self) -> (bool, bool) {
        (self.pre_initiator_static, self.pre_responder_static)
    }

    /// The fixed message sequence, each entry `(writer, tokens)`.
    pub fn messages(&self) -> &'static [(Role, &'static [Token])] {
        self.messages
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
