// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Card grammar for the bidirectional artifact sync protocol.
//!
//! This crate is a pure library: tokenization, escaping, and the `Card`
//! enum. It has no knowledge of sessions, stores, or transports — those
//! live in `xfer-core`, `xfer-server`, and `xfer-client`.

mod card;
mod codec;
mod error;
mod text;

pub use card::{Algorithm, Card, Hash, KnownPragma};
pub use codec::{encode, encode_all, CardReader};
pub use error::CardError;
pub use text::{escape, unescape};
