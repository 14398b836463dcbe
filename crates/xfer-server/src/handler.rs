// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Server-side request/reply handler (§4.F): walk one request's cards in
//! order, mutate session/store state, and produce the reply. Every write a
//! request causes happens inside one store transaction; a terminal error
//! rolls the whole thing back and the reply becomes just that one `error`
//! card, matching the "first error card ends the cycle" rule from §7 as
//! seen from the client's side of the wire.

use xfer_core::auth::{process_login, Credentials};
use xfer_core::error::{EngineError, ProtocolError};
use xfer_core::recv::{self, Side};
use xfer_core::send;
use xfer_core::session::{apply_known_pragma, Session};
use xfer_core::Engines;
use xfer_wire::{Card, CardReader};

/// Identity this server answers for, checked against a `pull`/`clone`
/// card's project code.
pub struct HandlerConfig {
    pub server_code: String,
    pub project_code: String,
}

enum Outcome {
    Reply(Vec<Card>),
    Terminal(Card),
}

/// Run one request through the state machine and return the encoded reply
/// bytes. Never returns `Err` for anything the wire protocol itself can
/// express as an `error` card — only for store-backend faults that leave
/// the transaction nothing sensible to commit.
pub fn handle_request(
    request: &[u8],
    engines: &mut Engines,
    session: &mut Session,
    creds: &dyn Credentials,
    config: &HandlerConfig,
) -> Result<Vec<u8>, EngineError> {
    engines.store.begin_write()?;
    match process(request, engines, session, creds, config) {
        Ok(Outcome::Reply(cards)) => {
            engines.store.commit()?;
            Ok(xfer_wire::encode_all(&cards))
        }
        Ok(Outcome::Terminal(err)) => {
            engines.store.rollback()?;
            Ok(xfer_wire::encode_all(&[err]))
        }
        Err(e) => {
            engines.store.rollback()?;
            Err(e)
        }
    }
}

fn terminal(session: &mut Session, err: ProtocolError) -> Result<Outcome, EngineError> {
    session.record_error(err.to_string());
    Ok(Outcome::Terminal(Card::Error(err.to_string())))
}

fn process(
    request: &[u8],
    engines: &mut Engines,
    session: &mut Session,
    creds: &dyn Credentials,
    config: &HandlerConfig,
) -> Result<Outcome, EngineError> {
    let mut reply = Vec::new();
    let mut req_read = false;
    let mut req_write = false;
    let mut clone_mode = false;

    let mut reader = CardReader::new(request);
    while let Some(parsed) = reader.next() {
        let card = match parsed {
            Ok(c) => c,
            Err(_) => return terminal(session, ProtocolError::MalformedAtomLine),
        };

        match card {
            Card::Pull { proj_code, .. } => {
                if proj_code.is_empty() {
                    return terminal(session, ProtocolError::MissingProjectCode);
                }
                if proj_code != config.project_code {
                    return terminal(session, ProtocolError::WrongProject);
                }
                if session.auth.read {
                    req_read = true;
                }
            }
            Card::Push { .. } => {
                if session.auth.write {
                    req_write = true;
                } else {
                    reply.push(Card::Message(ProtocolError::PullOnly.to_string()));
                }
            }
            Card::Clone { .. } => {
                if session.auth.clone {
                    req_read = true;
                    clone_mode = true;
                    session.policy.resync = engines.store.max_id()?;
                    reply.push(Card::Push {
                        server_code: config.server_code.clone(),
                        proj_code: config.project_code.clone(),
                    });
                }
            }
            Card::Login { user, nonce, sig } => {
                let tail = &request[reader.position()..];
                match process_login(&user, &nonce, &sig, tail, creds, engines.hasher) {
                    Ok(result) => session.auth.merge(result.capabilities),
                    Err(_) => return terminal(session, ProtocolError::LoginFailed),
                }
            }
            Card::File { hash, delta_src, payload, .. } => {
                if !req_write {
                    return terminal(session, ProtocolError::NotAuthorizedWrite);
                }
                let private = session.take_pending_private();
                if recv::handle_file(engines, session, &hash, delta_src.as_ref(), &payload, private).is_err() {
                    return terminal(session, ProtocolError::WrongHash(hash.to_string()));
                }
            }
            Card::Have { hash, .. } => {
                if !req_write {
                    return terminal(session, ProtocolError::NotAuthorizedWrite);
                }
                recv::handle_have(engines, session, &hash)?;
                // We just promised to fetch this artifact (§4.E "so we
                // subsequently request it"); ask for it in this very reply
                // rather than waiting a full round trip for nothing.
                if let Some(id) = engines.store.resolve(&hash, false)? {
                    if engines.store.state(id)? == xfer_core::store::ArtifactState::Phantom {
                        reply.push(Card::Gimme { hash: hash.clone() });
                    }
                }
            }
            Card::Need { hash } | Card::Gimme { hash } => {
                // Gated on the login-granted `session.auth.read`, not the
                // per-request `req_read` flag: login is re-sent every cycle
                // and already grants read to anonymous, so a continuation
                // cycle that carries no fresh `pull`/`clone` card (e.g. a
                // clone past its first round, or a push following up on
                // server roots) can still ask for content.
                match recv::handle_need_or_gimme(engines, session, &hash, Side::Server, true) {
                    Ok(cards) => reply.extend(cards),
                    Err(EngineError::Protocol(p)) => return terminal(session, p),
                    Err(e) => return Err(e),
                }
            }
            Card::Private => session.mark_private_pending(),
            Card::Pragma { name, args } => apply_known_pragma(session, &name, &args),
            Card::Cookie(_) | Card::Comment(_) | Card::Timestamp(_) | Card::Message(_) | Card::Error(_) => {}
            Card::Unknown { keyword, .. } => {
                // Tolerated, not terminal (§4.F: next state is "same"). The
                // client treats an `error` card in *our* reply as fatal;
                // that doesn't stop us from finishing our own pass.
                reply.push(Card::Error(ProtocolError::BadCommand(keyword).to_string()));
            }
            // Never sent client-to-server in practice (§4.A direction column).
            Card::CFile { .. } | Card::CloneSeqno(_) | Card::Igot { .. } => {}
        }
    }

    if clone_mode {
        reply.extend(send::send_roots(engines, session)?);
        reply.push(Card::CloneSeqno(session.policy.resync));
    } else if req_read || req_write {
        reply.extend(send::send_roots(engines, session)?);
        reply.extend(send::send_private(engines, session)?);
    }

    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    reply.push(Card::Timestamp(format!("{now} errors {}", session.counters.errors)));

    Ok(Outcome::Reply(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use xfer_core::crosslink::NoopCrosslink;
    use xfer_core::delta::NullDeltaCodec;
    use xfer_core::hash::{DualHasher, HashProvider};
    use xfer_core::session::{CapabilitySet, SessionPolicy};
    use xfer_core::store::InMemoryStore;
    use xfer_wire::{Algorithm, Hash};

    struct TestCreds(HashMap<String, (String, String)>);

    impl Credentials for TestCreds {
        fn lookup_secret(&self, user: &str) -> Option<String> {
            self.0.get(user).map(|(pw, _)| pw.clone())
        }
        fn capabilities_for(&self, user: &str) -> CapabilitySet {
            self.0.get(user).map(|(_, caps)| CapabilitySet::from_str(caps)).unwrap_or_default()
        }
    }

    fn config() -> HandlerConfig {
        HandlerConfig { server_code: "SRV".to_string(), project_code: "PROJ".to_string() }
    }

    fn login_request(user: &str, pw: &str, tail: &[u8]) -> Vec<u8> {
        let hasher = DualHasher;
        let nonce = hasher.hash_one_shot(Algorithm::Sha1, tail);
        let sig = hasher.hash_one_shot(Algorithm::Sha1, format!("{nonce}{pw}").as_bytes());
        let mut req = format!("login {user} {nonce} {sig}\n").into_bytes();
        req.extend_from_slice(tail);
        req
    }

    #[test]
    fn pull_without_login_grants_no_read_and_yields_no_content() {
        let mut store = InMemoryStore::new();
        let h = Hash::parse(&"a".repeat(40)).unwrap();
        store.seed(h, b"hello".to_vec(), false, true);
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut engines = Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        let creds = TestCreds(HashMap::new());

        let reply = handle_request(b"pull SRV PROJ\n", &mut engines, &mut session, &creds, &config()).unwrap();
        let text = String::from_utf8(reply).unwrap();
        assert!(!text.contains("have"));
    }

    #[test]
    fn anonymous_login_then_pull_yields_roots_as_have_cards() {
        let mut store = InMemoryStore::new();
        let h = Hash::parse(&"b".repeat(40)).unwrap();
        store.seed(h.clone(), b"hello".to_vec(), false, true);
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut engines = Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        let creds = TestCreds(HashMap::new());

        let tail = b"pull SRV PROJ\n".to_vec();
        let req = login_request("anonymous", "unused", &tail);

        let reply = handle_request(&req, &mut engines, &mut session, &creds, &config()).unwrap();
        let text = String::from_utf8(reply).unwrap();
        assert!(text.contains(&format!("have {h}")));
        assert!(text.contains("# timestamp"));
    }

    #[test]
    fn push_without_write_capability_gets_pull_only_message() {
        let mut store = InMemoryStore::new();
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut engines = Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        session.auth = CapabilitySet::anonymous();
        let creds = TestCreds(HashMap::new());

        let reply =
            handle_request(b"push SRV PROJ\n", &mut engines, &mut session, &creds, &config()).unwrap();
        let text = String::from_utf8(reply).unwrap();
        assert!(text.contains("pull only"));
    }

    #[test]
    fn file_without_push_is_terminal_not_authorized() {
        let mut store = InMemoryStore::new();
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut engines = Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        session.auth = CapabilitySet::anonymous();
        let creds = TestCreds(HashMap::new());

        let name = DualHasher.hash_one_shot(Algorithm::Sha1, b"hello");
        let req = format!("file {name} 5\nhello").into_bytes();
        let reply = handle_request(&req, &mut engines, &mut session, &creds, &config()).unwrap();
        let text = String::from_utf8(reply).unwrap();
        assert!(text.starts_with("error not authorized to write"));
    }

    #[test]
    fn wrong_project_code_is_terminal() {
        let mut store = InMemoryStore::new();
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut engines = Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        session.auth = CapabilitySet::anonymous();
        let creds = TestCreds(HashMap::new());

        let reply =
            handle_request(b"pull SRV WRONG\n", &mut engines, &mut session, &creds, &config()).unwrap();
        let text = String::from_utf8(reply).unwrap();
        assert_eq!(text.trim_end(), "error wrong\\sproject");
    }

    #[test]
    fn bad_command_is_non_terminal_and_keeps_processing() {
        let mut store = InMemoryStore::new();
        let h = Hash::parse(&"c".repeat(40)).unwrap();
        store.seed(h.clone(), b"hello".to_vec(), false, true);
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut engines = Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        session.auth = CapabilitySet::anonymous();
        let creds = TestCreds(HashMap::new());

        let req = b"pull SRV PROJ\nzorch foo\n".to_vec();
        let reply = handle_request(&req, &mut engines, &mut session, &creds, &config()).unwrap();
        let text = String::from_utf8(reply).unwrap();
        assert!(text.contains("bad command"));
        assert!(text.contains(&format!("have {h}")));
    }

    #[test]
    fn clone_seeds_every_held_artifact_via_have() {
        let mut store = InMemoryStore::new();
        let a = Hash::parse(&"1".repeat(40)).unwrap();
        let b = Hash::parse(&"2".repeat(40)).unwrap();
        store.seed(a.clone(), b"x".to_vec(), false, false);
        store.seed(b.clone(), b"y".to_vec(), false, false);
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut engines = Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        session.auth = CapabilitySet::anonymous();
        let creds = TestCreds(HashMap::new());

        let reply = handle_request(b"clone\n", &mut engines, &mut session, &creds, &config()).unwrap();
        let text = String::from_utf8(reply).unwrap();
        assert!(text.contains(&format!("have {a}")));
        assert!(text.contains(&format!("have {b}")));
        assert!(text.contains("clone_seqno 0"));
    }
}
