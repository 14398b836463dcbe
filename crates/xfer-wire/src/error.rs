// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors raised while parsing or emitting cards.
///
/// Every variant here has wire-visible text per the error handling design:
/// callers turn these into `error`/`message` cards verbatim via `Display`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("malformed atom line")]
    MalformedLine,

    #[error("bad command: {0}")]
    BadCommand(String),

    #[error("truncated payload: wanted {wanted} bytes, got {got}")]
    TruncatedPayload { wanted: usize, got: usize },

    #[error("invalid hash token: {0}")]
    InvalidHash(String),

    #[error("invalid integer token: {0}")]
    InvalidInt(String),

    #[error("wrong number of tokens for {keyword}: {count}")]
    WrongTokenCount { keyword: String, count: usize },

    #[error("server returned HTML, not protocol")]
    HtmlResponse,
}
