// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Ephemeral Index (§4.B): two per-cycle scratch sets. Neither is
//! persistent session state — both are re-created empty at the start of
//! each cycle and dropped at its end.

use std::collections::HashSet;

use xfer_wire::Hash;

#[derive(Debug, Default)]
pub struct EphemeralIndex {
    /// Names the remote has announced, or that we have already sent/announced
    /// ourselves — each name crosses the wire at most once per session.
    have: HashSet<Hash>,
    /// Names requested from us that we have not yet satisfied, or that we
    /// have requested from the remote.
    need: HashSet<Hash>,
}

impl EphemeralIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert. Returns `true` if `name` was not already present.
    pub fn mark_have(&mut self, name: &Hash) -> bool {
        self.have.insert(name.clone())
    }

    pub fn has(&self, name: &Hash) -> bool {
        self.have.contains(name)
    }

    pub fn mark_need(&mut self, name: &Hash) -> bool {
        self.need.insert(name.clone())
    }

    pub fn needs(&self, name: &Hash) -> bool {
        self.need.contains(name)
    }

    pub fn clear_need(&mut self, name: &Hash) {
        self.need.remove(name);
    }

    pub fn need_count(&self) -> usize {
        self.need.len()
    }
}
