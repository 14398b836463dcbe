// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Store contract (§6) and a reference in-memory implementation.
//!
//! The real content store is explicitly out of scope (§1): persistence
//! format, GC, and on-disk layout belong to a caller-supplied
//! implementation. `InMemoryStore` exists only as ambient test/demo
//! infrastructure, grounded the way `sven-node::control::service` keeps an
//! in-memory table behind a trait boundary rather than touching a real
//! database from test code.

use std::collections::HashMap;

use xfer_wire::Hash;

use crate::error::StoreError;

pub type ArtifactId = u64;

/// Phantoms and cyclic references (§9 Design Notes): transitions are
/// one-way, `absent -> phantom -> present`. `Shunned` is a separate,
/// terminal marker applied by policy rather than by the sync protocol
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Present,
    Phantom,
    Shunned,
}

/// Required operations the core calls (§6).
pub trait Store: Send {
    fn resolve(&mut self, name: &Hash, create_phantom: bool) -> Result<Option<ArtifactId>, StoreError>;
    fn new_phantom(&mut self, name: &Hash, private: bool) -> Result<ArtifactId, StoreError>;
    fn put(
        &mut self,
        content: &[u8],
        name: &Hash,
        src_id: Option<ArtifactId>,
        compressed: bool,
        private: bool,
    ) -> Result<ArtifactId, StoreError>;
    fn get(&self, id: ArtifactId) -> Result<Vec<u8>, StoreError>;
    fn is_private(&self, id: ArtifactId) -> Result<bool, StoreError>;
    fn is_shunned(&self, name: &Hash) -> Result<bool, StoreError>;
    fn make_private(&mut self, id: ArtifactId) -> Result<(), StoreError>;
    fn make_public(&mut self, id: ArtifactId) -> Result<(), StoreError>;
    fn enumerate_all(&self) -> Result<Vec<Hash>, StoreError>;
    fn state(&self, id: ArtifactId) -> Result<ArtifactState, StoreError>;
    fn name_of(&self, id: ArtifactId) -> Result<Hash, StoreError>;

    /// Ids this side considers "roots" for unconditional gossip each cycle.
    fn root_ids(&self) -> Result<Vec<ArtifactId>, StoreError>;
    /// All ids `<= max`, descending, for a `resync` sweep (§4.D, §3 invariant 5).
    fn ids_up_to(&self, max: ArtifactId) -> Result<Vec<ArtifactId>, StoreError>;
    fn private_ids(&self) -> Result<Vec<ArtifactId>, StoreError>;
    fn max_id(&self) -> Result<ArtifactId, StoreError>;
    /// Artifacts this side has a name for but no content yet — the client
    /// driver's `gimme` worklist (§4.G).
    fn phantom_ids(&self) -> Result<Vec<ArtifactId>, StoreError>;

    /// The basis this artifact is natively stored as a delta against, if any.
    fn native_delta_parent(&self, id: ArtifactId) -> Result<Option<ArtifactId>, StoreError>;
    /// A logical-parent candidate for a parent-heuristic delta (§4.D.6b).
    /// Reference stores with no such metadata simply return `None`.
    fn parent_heuristic(&self, id: ArtifactId) -> Result<Option<ArtifactId>, StoreError>;

    fn begin_write(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;
}

#[derive(Clone)]
struct Entry {
    name: Hash,
    state: ArtifactState,
    private: bool,
    content: Option<Vec<u8>>,
    native_parent: Option<ArtifactId>,
    /// A dangling delta: payload bytes plus the basis id they're relative
    /// to, recorded while the basis is still a phantom (§4.E "file" case 2).
    pending_delta: Option<(ArtifactId, Vec<u8>)>,
    is_root: bool,
}

/// Simple in-memory `Store`. Ids are assigned sequentially starting at 1.
#[derive(Default)]
pub struct InMemoryStore {
    by_id: HashMap<ArtifactId, Entry>,
    by_name: HashMap<Hash, ArtifactId>,
    shunned: std::collections::HashSet<Hash>,
    next_id: ArtifactId,
    in_transaction: bool,
    /// Pre-`begin_write` state, restored verbatim by `rollback` (§4.F/§7:
    /// a terminal error must leave no trace of the request's writes).
    snapshot: Option<(
        HashMap<ArtifactId, Entry>,
        HashMap<Hash, ArtifactId>,
        std::collections::HashSet<Hash>,
        ArtifactId,
    )>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore { next_id: 1, ..Default::default() }
    }

    /// Test/demo helper: insert fully-formed content directly, bypassing
    /// the wire-facing `put`. Returns the assigned id.
    pub fn seed(&mut self, name: Hash, content: Vec<u8>, private: bool, is_root: bool) -> ArtifactId {
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(
            id,
            Entry {
                name,
                state: ArtifactState::Present,
                private,
                content: Some(content),
                native_parent: None,
                pending_delta: None,
                is_root,
            },
        );
        id
    }

    /// Mark an artifact as natively stored as a delta against `parent`, for
    /// native-delta send-path tests.
    pub fn set_native_parent(&mut self, id: ArtifactId, parent: ArtifactId) {
        if let Some(e) = self.by_id.get_mut(&id) {
            e.native_parent = Some(parent);
        }
    }

    pub fn shun(&mut self, name: Hash) {
        self.shunned.insert(name);
    }

    fn get_entry(&self, id: ArtifactId) -> Result<&Entry, StoreError> {
        self.by_id.get(&id).ok_or(StoreError::UnknownId(id))
    }
}

impl Store for InMemoryStore {
    fn resolve(&mut self, name: &Hash, create_phantom: bool) -> Result<Option<ArtifactId>, StoreError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(Some(id));
        }
        if create_phantom {
            return Ok(Some(self.new_phantom(name, false)?));
        }
        Ok(None)
    }

    fn new_phantom(&mut self, name: &Hash, private: bool) -> Result<ArtifactId, StoreError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(
            id,
            Entry {
                name: name.clone(),
                state: ArtifactState::Phantom,
                private,
                content: None,
                native_parent: None,
                pending_delta: None,
                is_root: false,
            },
        );
        Ok(id)
    }

    fn put(
        &mut self,
        content: &[u8],
        name: &Hash,
        src_id: Option<ArtifactId>,
        _compressed: bool,
        private: bool,
    ) -> Result<ArtifactId, StoreError> {
        let id = self.resolve(name, true)?.expect("just created if absent");
        match src_id {
            Some(basis_id) if matches!(self.get_entry(basis_id)?.state, ArtifactState::Phantom) => {
                // Dangling delta: record it, leave this entry as a phantom.
                let entry = self.by_id.get_mut(&id).expect("resolved above");
                entry.pending_delta = Some((basis_id, content.to_vec()));
                entry.private = private;
            }
            _ => {
                let entry = self.by_id.get_mut(&id).expect("resolved above");
                entry.content = Some(content.to_vec());
                entry.state = ArtifactState::Present;
                entry.private = private;
            }
        }
        Ok(id)
    }

    fn get(&self, id: ArtifactId) -> Result<Vec<u8>, StoreError> {
        let entry = self.get_entry(id)?;
        entry.content.clone().ok_or_else(|| StoreError::PhantomContent(entry.name.clone()))
    }

    fn is_private(&self, id: ArtifactId) -> Result<bool, StoreError> {
        Ok(self.get_entry(id)?.private)
    }

    fn is_shunned(&self, name: &Hash) -> Result<bool, StoreError> {
        Ok(self.shunned.contains(name))
    }

    fn make_private(&mut self, id: ArtifactId) -> Result<(), StoreError> {
        self.by_id.get_mut(&id).ok_or(StoreError::UnknownId(id))?.private = true;
        Ok(())
    }

    fn make_public(&mut self, id: ArtifactId) -> Result<(), StoreError> {
        self.by_id.get_mut(&id).ok_or(StoreError::UnknownId(id))?.private = false;
        Ok(())
    }

    fn enumerate_all(&self) -> Result<Vec<Hash>, StoreError> {
        Ok(self.by_id.values().map(|e| e.name.clone()).collect())
    }

    fn state(&self, id: ArtifactId) -> Result<ArtifactState, StoreError> {
        Ok(self.get_entry(id)?.state)
    }

    fn name_of(&self, id: ArtifactId) -> Result<Hash, StoreError> {
        Ok(self.get_entry(id)?.name.clone())
    }

    fn root_ids(&self) -> Result<Vec<ArtifactId>, StoreError> {
        let mut ids: Vec<ArtifactId> = self
            .by_id
            .iter()
            .filter(|(_, e)| e.is_root && e.state == ArtifactState::Present)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn ids_up_to(&self, max: ArtifactId) -> Result<Vec<ArtifactId>, StoreError> {
        let mut ids: Vec<ArtifactId> = self
            .by_id
            .keys()
            .copied()
            .filter(|&id| id <= max && self.by_id[&id].state == ArtifactState::Present)
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    fn private_ids(&self) -> Result<Vec<ArtifactId>, StoreError> {
        Ok(self
            .by_id
            .iter()
            .filter(|(_, e)| e.private && e.state == ArtifactState::Present)
            .map(|(&id, _)| id)
            .collect())
    }

    fn max_id(&self) -> Result<ArtifactId, StoreError> {
        Ok(self.by_id.keys().copied().max().unwrap_or(0))
    }

    fn phantom_ids(&self) -> Result<Vec<ArtifactId>, StoreError> {
        let mut ids: Vec<ArtifactId> = self
            .by_id
            .iter()
            .filter(|(_, e)| e.state == ArtifactState::Phantom)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn native_delta_parent(&self, id: ArtifactId) -> Result<Option<ArtifactId>, StoreError> {
        Ok(self.get_entry(id)?.native_parent)
    }

    fn parent_heuristic(&self, _id: ArtifactId) -> Result<Option<ArtifactId>, StoreError> {
        Ok(None)
    }

    fn begin_write(&mut self) -> Result<(), StoreError> {
        self.in_transaction = true;
        self.snapshot = Some((self.by_id.clone(), self.by_name.clone(), self.shunned.clone(), self.next_id));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.in_transaction = false;
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.in_transaction = false;
        if let Some((by_id, by_name, shunned, next_id)) = self.snapshot.take() {
            self.by_id = by_id;
            self.by_name = by_name;
            self.shunned = shunned;
            self.next_id = next_id;
        }
        Ok(())
    }
}
