// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Hash capability set: `hash-one-shot`, `verify-against-name`, and
//! algorithm selection by name length. Hash primitives themselves are an
//! external collaborator per the spec (§1) — this module is the thin,
//! concrete capability-set implementation every caller in this workspace
//! uses, grounded on `sven-node::crypto::token`'s `sha2::Sha256::digest`
//! one-shot pattern.

use sha1::Sha1;
use sha3::{Digest, Sha3_256};
use xfer_wire::{Algorithm, Hash};

/// `hash-one-shot` / `verify-against-name` from §6 External Interfaces.
pub trait HashProvider: Send + Sync {
    fn hash_one_shot(&self, algo: Algorithm, bytes: &[u8]) -> Hash;

    /// Algorithm is derived from `name`'s length, per the dual-hash
    /// capability negotiation contract (§9).
    fn verify(&self, bytes: &[u8], name: &Hash) -> bool {
        self.hash_one_shot(name.algorithm(), bytes) == *name
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DualHasher;

impl HashProvider for DualHasher {
    fn hash_one_shot(&self, algo: Algorithm, bytes: &[u8]) -> Hash {
        let hex = match algo {
            Algorithm::Sha1 => {
                let mut h = Sha1::new();
                h.update(bytes);
                hex::encode(h.finalize())
            }
            Algorithm::Sha3_256 => {
                let mut h = Sha3_256::new();
                h.update(bytes);
                hex::encode(h.finalize())
            }
        };
        Hash::parse(&hex).expect("hex::encode output is always valid hex of the right length")
    }
}
