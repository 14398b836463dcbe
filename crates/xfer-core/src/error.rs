// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;
use xfer_wire::Hash;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown artifact id {0}")]
    UnknownId(u64),
    #[error("artifact content unavailable (phantom): {0}")]
    PhantomContent(Hash),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login failed")]
    LoginFailed,
    #[error("malformed nonce or signature")]
    MalformedCredential,
}

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("delta apply failed: {0}")]
    Apply(String),
    #[error("delta encode failed: {0}")]
    Encode(String),
}

/// Wire-visible protocol errors (§7). `Display` produces the exact text
/// that goes into an `error`/`message` card body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not authorized to read")]
    NotAuthorizedRead,
    #[error("not authorized to write")]
    NotAuthorizedWrite,
    #[error("not authorized to clone")]
    NotAuthorizedClone,
    #[error("login failed")]
    LoginFailed,
    #[error("bad command: {0}")]
    BadCommand(String),
    #[error("malformed atom line")]
    MalformedAtomLine,
    #[error("wrong hash on received artifact: {0}")]
    WrongHash(String),
    #[error("missing project code")]
    MissingProjectCode,
    #[error("wrong project")]
    WrongProject,
    #[error("pull only - not authorized to push")]
    PullOnly,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Delta(#[from] DeltaError),
    #[error("artifact name mismatch: expected {expected}, store has {actual}")]
    NameMismatch { expected: Hash, actual: Hash },
    #[error("wrong hash on received artifact: {0}")]
    HashMismatch(Hash),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
