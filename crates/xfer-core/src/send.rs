// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Send engine (§4.D): entry points sharing one per-artifact eligibility
//! algorithm. `send_roots`/`send_private` are announce-only (they only
//! ever emit gossip cards); `send_file` is the one that actually streams
//! content, used when answering `gimme`/`need`, when seeding a clone, and
//! (via `send_push_content`) when a pushing client sends its own content
//! unprompted.

use xfer_wire::{Algorithm, Card, Hash};

use crate::error::EngineError;
use crate::store::{ArtifactId, Store};
use crate::Engines;
use crate::session::Session;

/// Shared steps 1-4 of §4.D: is this artifact even worth mentioning to the
/// remote this cycle? Returns the name and its private bit when eligible,
/// `None` when the artifact should be skipped (already announced, shunned,
/// or a private artifact this session doesn't sync and the peer can't take
/// a bare teaser for).
fn announce_eligible(
    engines: &mut Engines,
    session: &Session,
    id: ArtifactId,
) -> Result<Option<(Hash, bool)>, EngineError> {
    let name = engines.store.name_of(id)?;
    let private = engines.store.is_private(id)?;

    if private && !session.policy.sync_private && !session.peer.supports_private_teaser {
        return Ok(None);
    }
    if session.index.has(&name) {
        return Ok(None);
    }
    if engines.store.is_shunned(&name)? {
        return Ok(None);
    }
    Ok(Some((name, private)))
}

/// Walk the root set, or (when `resync > 0`) all ids up to the cursor
/// descending, emitting `have` gossip until the outbound cap is hit.
/// `resync` is updated to the next unprocessed id, or `0` once the sweep
/// completes, preserving the monotonically-non-increasing invariant.
pub fn send_roots(engines: &mut Engines, session: &mut Session) -> Result<Vec<Card>, EngineError> {
    let mut cards = Vec::new();

    if session.policy.resync > 0 {
        let ids = engines.store.ids_up_to(session.policy.resync)?;
        let mut exhausted = true;
        for id in ids {
            if session.over_budget() {
                session.policy.resync = id;
                exhausted = false;
                break;
            }
            if let Some((name, private)) = announce_eligible(engines, session, id)? {
                session.index.mark_have(&name);
                cards.push(Card::Have { hash: name, is_private: private });
            }
        }
        if exhausted {
            session.policy.resync = 0;
        }
    } else {
        for id in engines.store.root_ids()? {
            if session.over_budget() {
                break;
            }
            if let Some((name, private)) = announce_eligible(engines, session, id)? {
                session.index.mark_have(&name);
                cards.push(Card::Have { hash: name, is_private: private });
            }
        }
    }

    Ok(cards)
}

/// `igot H 1` for every private artifact, only when `sync_private` is set.
pub fn send_private(engines: &mut Engines, session: &mut Session) -> Result<Vec<Card>, EngineError> {
    if !session.policy.sync_private {
        return Ok(Vec::new());
    }
    let mut cards = Vec::new();
    for id in engines.store.private_ids()? {
        if session.over_budget() {
            break;
        }
        let name = engines.store.name_of(id)?;
        if session.index.has(&name) || engines.store.is_shunned(&name)? {
            continue;
        }
        session.index.mark_have(&name);
        session.counters.igots_sent += 1;
        cards.push(Card::Igot { hash: name, is_private: true });
    }
    Ok(cards)
}

/// Pick the cheapest body for `content`: native delta beats parent-heuristic
/// delta beats raw, and a delta is only used when it is not longer than
/// sending the artifact raw (§4.D tie-break).
fn choose_body(
    engines: &mut Engines,
    session: &Session,
    id: ArtifactId,
    content: &[u8],
) -> Result<(Option<Hash>, Vec<u8>), EngineError> {
    if let Some(parent_id) = engines.store.native_delta_parent(id)? {
        let parent_name = engines.store.name_of(parent_id)?;
        if session.index.has(&parent_name) {
            let basis = engines.store.get(parent_id)?;
            let patch = engines.delta.encode(&basis, content)?;
            return Ok((Some(parent_name), patch));
        }
    }

    if content.len() > 100 {
        if let Some(parent_id) = engines.store.parent_heuristic(id)? {
            let parent_name = engines.store.name_of(parent_id)?;
            let basis = engines.store.get(parent_id)?;
            let patch = engines.delta.encode(&basis, content)?;
            if patch.len() < content.len() {
                return Ok((Some(parent_name), patch));
            }
        }
    }

    Ok((None, content.to_vec()))
}

/// Transmit one artifact: the full 8-step algorithm, used when answering
/// `gimme`/`need` and when the server handler seeds content directly.
pub fn send_file(
    engines: &mut Engines,
    session: &mut Session,
    id: ArtifactId,
    use_delta: bool,
) -> Result<Vec<Card>, EngineError> {
    let name = engines.store.name_of(id)?;
    let private = engines.store.is_private(id)?;

    if private && !session.policy.sync_private {
        if session.peer.supports_private_teaser {
            session.index.mark_have(&name);
            return Ok(vec![Card::Have { hash: name, is_private: true }]);
        }
        return Ok(Vec::new());
    }
    if session.index.has(&name) {
        return Ok(Vec::new());
    }
    if engines.store.is_shunned(&name)? {
        return Ok(Vec::new());
    }
    if name.algorithm() == Algorithm::Sha3_256 && !session.peer.supports_sha3 {
        session.record_error(format!("{name}: peer does not support sha3"));
        return Ok(vec![Card::Error(format!("cannot send {name}: remote has no sha3 support"))]);
    }
    if session.over_budget() {
        session.index.mark_have(&name);
        session.counters.igots_sent += 1;
        return Ok(vec![Card::Have { hash: name, is_private: false }]);
    }

    let content = engines.store.get(id)?;
    let (delta_src, payload) = if use_delta {
        choose_body(engines, session, id, &content)?
    } else {
        (None, content)
    };
    let is_delta = delta_src.is_some();

    let mut cards = Vec::new();
    if private {
        cards.push(Card::Private);
    }
    let size = payload.len() as u64;
    cards.push(Card::File { hash: name.clone(), delta_src, size, payload });

    session.index.mark_have(&name);
    session.bytes_sent += size as usize;
    session.counters.files_sent += 1;
    if is_delta {
        session.counters.deltas_sent += 1;
    }

    Ok(cards)
}

/// Push the actual content of every root (and, if syncing private
/// artifacts, every private one) the peer hasn't acknowledged yet (§8
/// scenario 2: a push includes `file` cards directly in the same request
/// rather than waiting on a `have`/`gimme` round trip — nothing obliges
/// the remote to ask for content it doesn't know exists). Delegates the
/// per-artifact decision (raw vs. delta vs. budget-degraded `have`-only)
/// to [`send_file`], so a name already marked in the session index from an
/// earlier call this cycle is skipped rather than resent.
pub fn send_push_content(engines: &mut Engines, session: &mut Session, use_delta: bool) -> Result<Vec<Card>, EngineError> {
    let mut cards = Vec::new();
    for id in engines.store.root_ids()? {
        if session.over_budget() {
            break;
        }
        cards.extend(send_file(engines, session, id, use_delta)?);
    }
    if session.policy.sync_private {
        for id in engines.store.private_ids()? {
            if session.over_budget() {
                break;
            }
            cards.extend(send_file(engines, session, id, use_delta)?);
        }
    }
    Ok(cards)
}
