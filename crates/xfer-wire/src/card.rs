// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The card grammar: keywords, tokens, and the [`Card`] enum itself.
//!
//! A card is one newline-terminated line beginning with a keyword, followed
//! by up to five whitespace-separated tokens. `file`/`cfile` cards are
//! payload-bearing: a fixed number of raw bytes follow the line before the
//! next card begins. See `spec.md` §4.A for the full grammar table.

use crate::error::CardError;

/// The hash algorithm a [`Hash`] was produced with. Selected purely by the
/// hex string's length: 40 hex chars is SHA-1, 64 is SHA-3-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Sha1,
    Sha3_256,
}

impl Algorithm {
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Algorithm::Sha1),
            64 => Some(Algorithm::Sha3_256),
            _ => None,
        }
    }
}

/// A content-name token: lowercase hex, 40 (SHA-1) or 64 (SHA-3-256) chars.
///
/// Comparisons are case-insensitive on input but the canonical form stored
/// here is always lowercase, so `Eq`/`Hash`/`Ord` on `Hash` are exact byte
/// comparisons of that canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(String);

impl Hash {
    pub fn parse(token: &str) -> Result<Self, CardError> {
        if !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CardError::InvalidHash(token.to_string()));
        }
        if Algorithm::from_hex_len(token.len()).is_none() {
            return Err(CardError::InvalidHash(token.to_string()));
        }
        Ok(Hash(token.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn algorithm(&self) -> Algorithm {
        Algorithm::from_hex_len(self.0.len()).expect("validated at construction")
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A known pragma name the core reacts to. Anything else round-trips as
/// [`Card::Pragma`] and is otherwise ignored, per §4.A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownPragma {
    ClientVersion,
    UvSync,
    NoCompress,
}

impl KnownPragma {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "client-version" => Some(KnownPragma::ClientVersion),
            "uv-sync" => Some(KnownPragma::UvSync),
            "nocompress" => Some(KnownPragma::NoCompress),
            _ => None,
        }
    }
}

/// One parsed card. Payload bytes (for `File`/`CFile`) are owned `Vec<u8>`s
/// sliced directly out of the request/reply buffer by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    Push { server_code: String, proj_code: String },
    Pull { server_code: String, proj_code: String },
    Clone { vers: Option<u32>, seq: Option<u64> },
    Login { user: String, nonce: String, sig: String },
    Have { hash: Hash, is_private: bool },
    Igot { hash: Hash, is_private: bool },
    Need { hash: Hash },
    Gimme { hash: Hash },
    File { hash: Hash, delta_src: Option<Hash>, size: u64, payload: Vec<u8> },
    CFile { hash: Hash, delta_src: Option<Hash>, usize: u64, csize: u64, payload: Vec<u8> },
    Private,
    CloneSeqno(u64),
    Cookie(String),
    Pragma { name: String, args: Vec<String> },
    Message(String),
    Error(String),
    /// `# timestamp <ISO-8601>` — the only comment form the core interprets.
    Timestamp(String),
    /// Any other comment line, kept verbatim (minus the leading `#`).
    Comment(String),
    /// A syntactically valid line with an unrecognized keyword. Tolerated
    /// only when the first character is a letter (§7).
    Unknown { keyword: String, raw: String },
}

impl Card {
    pub fn keyword(&self) -> &'static str {
        match self {
            Card::Push { .. } => "push",
            Card::Pull { .. } => "pull",
            Card::Clone { .. } => "clone",
            Card::Login { .. } => "login",
            Card::Have { .. } => "have",
            Card::Igot { .. } => "igot",
            Card::Need { .. } => "need",
            Card::Gimme { .. } => "gimme",
            Card::File { .. } => "file",
            Card::CFile { .. } => "cfile",
            Card::Private => "private",
            Card::CloneSeqno(_) => "clone_seqno",
            Card::Cookie(_) => "cookie",
            Card::Pragma { .. } => "pragma",
            Card::Message(_) => "message",
            Card::Error(_) => "error",
            Card::Timestamp(_) => "#",
            Card::Comment(_) => "#",
            Card::Unknown { .. } => "?",
        }
    }

    /// `true` for cards that carry a following raw-byte payload.
    pub fn has_payload(&self) -> bool {
        matches!(self, Card::File { .. } | Card::CFile { .. })
    }
}
