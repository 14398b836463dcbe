// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Receive engine (§4.E): per-keyword handling of inbound cards once the
//! codec has parsed them. Dispatch by keyword is the caller's job (the
//! server handler and client driver each walk their own card stream); this
//! module only holds the per-card behavior.

use xfer_wire::{Card, Hash};

use crate::error::{EngineError, ProtocolError};
use crate::send::send_file;
use crate::session::Session;
use crate::store::{ArtifactState, Store};
use crate::Engines;

/// Which role is processing the card. `need`/`gimme` require an
/// authorization check that differs by which side is being asked to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

fn finish_file(
    engines: &mut Engines,
    session: &mut Session,
    hash: &Hash,
    content: &[u8],
    private: bool,
    is_delta: bool,
) -> Result<(), EngineError> {
    if !engines.hasher.verify(content, hash) {
        session.record_error(format!("wrong hash on received artifact: {hash}"));
        return Err(EngineError::HashMismatch(hash.clone()));
    }

    let id = engines.store.put(content, hash, None, false, private)?;
    if !private {
        engines.store.make_public(id)?;
    }
    engines.crosslink.on_artifact_complete(hash);
    session.index.mark_have(hash);
    session.counters.files_received += 1;
    if is_delta {
        session.counters.deltas_received += 1;
    }
    Ok(())
}

/// `file H [DELTASRC] SIZE \n CONTENT` (§4.E, steps 1-6).
///
/// `private` is whatever the session's pending-`private`-card flag says
/// *right now* — callers must have already consumed it via
/// [`Session::take_pending_private`] before calling this, so a `private`
/// card followed immediately by anything other than `file`/`cfile` doesn't
/// leak onto a later artifact.
pub fn handle_file(
    engines: &mut Engines,
    session: &mut Session,
    hash: &Hash,
    delta_src: Option<&Hash>,
    payload: &[u8],
    private: bool,
) -> Result<(), EngineError> {
    if let Some(src_name) = delta_src {
        let src_id = engines
            .store
            .resolve(src_name, true)?
            .expect("resolve always returns Some when create_phantom is true");

        if engines.store.state(src_id)? == ArtifactState::Phantom {
            // Dangling delta: the basis hasn't arrived yet. Store it
            // pending rather than applying against missing content.
            engines.store.put(payload, hash, Some(src_id), false, private)?;
            session.index.mark_have(hash);
            session.counters.deltas_received += 1;
            return Ok(());
        }

        let basis = engines.store.get(src_id)?;
        let content = engines.delta.apply(&basis, payload)?;
        return finish_file(engines, session, hash, &content, private, true);
    }

    finish_file(engines, session, hash, payload, private, false)
}

/// `have H [PRIV]`, server-side: resolve or create a phantom for `H` so a
/// later cycle can `gimme` it, and record that the remote already has it.
pub fn handle_have(engines: &mut Engines, session: &mut Session, hash: &Hash) -> Result<(), EngineError> {
    engines.store.resolve(hash, true)?;
    session.index.mark_have(hash);
    Ok(())
}

/// `igot H [PRIV]`, client-side: phantom it (so the driver emits `gimme`
/// next cycle) if absent, else harmonize the private bit.
pub fn handle_igot(
    engines: &mut Engines,
    session: &mut Session,
    hash: &Hash,
    is_private: bool,
) -> Result<(), EngineError> {
    match engines.store.resolve(hash, false)? {
        None => {
            engines.store.new_phantom(hash, is_private)?;
            session.index.mark_need(hash);
        }
        Some(id) => {
            if is_private {
                engines.store.make_private(id)?;
            } else {
                engines.store.make_public(id)?;
            }
        }
    }
    session.index.mark_have(hash);
    session.counters.igots_received += 1;
    Ok(())
}

/// `gimme`/`need H`: if the caller has read authorization, look the
/// artifact up and hand it to the send engine. Silently produces nothing
/// if we don't have it either (no point announcing what we don't hold).
pub fn handle_need_or_gimme(
    engines: &mut Engines,
    session: &mut Session,
    hash: &Hash,
    side: Side,
    use_delta: bool,
) -> Result<Vec<Card>, EngineError> {
    let authorized = match side {
        Side::Server => session.auth.read,
        Side::Client => session.auth.write,
    };
    if !authorized {
        return Err(EngineError::Protocol(ProtocolError::NotAuthorizedRead));
    }

    match engines.store.resolve(hash, false)? {
        Some(id) => send_file(engines, session, id, use_delta),
        None => Ok(Vec::new()),
    }
}

/// `clone_seqno N`, client-only: advance the cursor and request the next
/// batch while `N > 0`.
pub fn handle_clone_seqno(n: u64) -> Option<Card> {
    if n > 0 {
        Some(Card::Clone { vers: Some(3), seq: Some(n) })
    } else {
        None
    }
}
