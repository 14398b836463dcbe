// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Client driver (§4.G): build one cycle's outbound card stream, exchange
//! it via the transport, feed the reply through the receive engine, then
//! evaluate the go/stop continuation predicate. Repeats until the
//! predicate says stop or the transport errors out.

use rand::RngCore;

use xfer_core::recv::{self, Side};
use xfer_core::send;
use xfer_core::session::{apply_known_pragma, Session};
use xfer_core::Engines;
use xfer_wire::{Algorithm, Card, CardReader};

use crate::error::ClientError;
use crate::transport::Transport;

/// Which half of a sync this driver runs: pull (read), push (write), or an
/// initial clone (read, plus the seed-everything continuation protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Pull,
    Push,
    Clone,
}

pub struct ClientConfig {
    pub server_code: String,
    pub project_code: String,
    pub mode: SyncMode,
    /// `None` logs in as `anonymous`.
    pub user: Option<String>,
    pub secret: Option<String>,
    pub cookie: Option<String>,
    pub client_version: u32,
    pub compress: bool,
}

impl ClientConfig {
    pub fn login_user(&self) -> &str {
        self.user.as_deref().unwrap_or("anonymous")
    }
}

/// End-of-session clock-skew verdict (§4.G): `None` when no `# timestamp`
/// card was ever seen, or the seen skew never exceeded the ±10s threshold.
#[derive(Debug, Clone, Copy)]
pub struct SkewReport {
    pub seconds: i64,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub cycles: u32,
    pub files_received: u64,
    pub files_sent: u64,
    pub errors: u64,
    pub skew: Option<SkewReport>,
}

/// Run cycles until the continuation predicate says stop.
pub async fn run_sync(
    transport: &dyn Transport,
    engines: &mut Engines<'_>,
    session: &mut Session,
    config: &ClientConfig,
) -> Result<SyncReport, ClientError> {
    // The server's `need`/`gimme` replies are gated on local willingness to
    // push (§4.E `Side::Client` branch); grant it up front rather than
    // waiting on a capability the wire protocol never actually sends back.
    session.auth.write = matches!(config.mode, SyncMode::Push | SyncMode::Clone);

    let mut cycle: u32 = 0;
    let mut pending_clone: Option<Card> =
        if config.mode == SyncMode::Clone { Some(Card::Clone { vers: None, seq: None }) } else { None };
    let mut pending_push: Vec<Card> = Vec::new();
    let mut gimme_cap: usize = 200;
    let mut max_skew_secs: i64 = 0;
    let mut skew_seen = false;

    loop {
        cycle += 1;
        session.begin_cycle();

        let files_received_before = session.counters.files_received;
        let files_sent_before = session.counters.files_sent;
        let phantoms_before = engines.store.phantom_ids()?.len();

        let mut rest = Vec::new();
        rest.push(Card::Pragma {
            name: "client-version".to_string(),
            args: vec![config.client_version.to_string()],
        });
        if let Some(cookie) = &config.cookie {
            rest.push(Card::Cookie(cookie.clone()));
        }

        match config.mode {
            SyncMode::Pull => {
                rest.push(Card::Pull {
                    server_code: config.server_code.clone(),
                    proj_code: config.project_code.clone(),
                });
            }
            SyncMode::Push => {
                rest.push(Card::Push {
                    server_code: config.server_code.clone(),
                    proj_code: config.project_code.clone(),
                });
            }
            SyncMode::Clone => {
                if let Some(c) = pending_clone.take() {
                    rest.push(c);
                }
            }
        }

        rest.append(&mut pending_push);

        let mut issued = 0usize;
        for id in engines.store.phantom_ids()? {
            if issued >= gimme_cap {
                break;
            }
            let name = engines.store.name_of(id)?;
            rest.push(Card::Gimme { hash: name });
            issued += 1;
        }

        // A push sends its own content directly (§8 scenario 2: `file`
        // cards ride in the same request as the `have` they're paired
        // with) rather than announcing via `have` and waiting for the
        // server to ask back — nothing obliges the server to ask, and a
        // client-side `have` marks the session index same as a send would,
        // which would make a later same-cycle `gimme` for it a no-op.
        if config.mode == SyncMode::Push {
            rest.extend(send::send_push_content(engines, session, true)?);
        }

        let mut nonce_tail = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce_tail);
        rest.push(Card::Comment(hex::encode(nonce_tail)));

        let rest_bytes = xfer_wire::encode_all(&rest);

        let login_nonce = engines.hasher.hash_one_shot(Algorithm::Sha1, &rest_bytes);
        let secret = config.secret.as_deref().unwrap_or("");
        let sig = engines.hasher.hash_one_shot(Algorithm::Sha1, format!("{login_nonce}{secret}").as_bytes());
        let login = Card::Login {
            user: config.login_user().to_string(),
            nonce: login_nonce.as_str().to_string(),
            sig: sig.as_str().to_string(),
        };

        let mut out = xfer_wire::encode(&login);
        out.extend(rest_bytes);

        let reply = transport.exchange(out, 20, config.compress).await?;
        let bytes_received = reply.len();

        let mut fatal = false;
        let mut clone_seqno_val: u64 = 0;
        let mut server_ts: Option<String> = None;

        let mut reader = CardReader::new(&reply);
        while let Some(parsed) = reader.next() {
            let card = match parsed {
                Ok(c) => c,
                Err(e) => {
                    session.record_error(format!("malformed reply card: {e}"));
                    fatal = true;
                    break;
                }
            };

            match card {
                Card::Error(text) => {
                    session.record_error(text);
                    fatal = true;
                    break;
                }
                Card::Message(text) => {
                    tracing::info!(%text, "server message");
                }
                Card::Have { hash, is_private } | Card::Igot { hash, is_private } => {
                    recv::handle_igot(engines, session, &hash, is_private)?;
                }
                Card::File { hash, delta_src, payload, .. } => {
                    let private = session.take_pending_private();
                    if recv::handle_file(engines, session, &hash, delta_src.as_ref(), &payload, private).is_err() {
                        fatal = true;
                        break;
                    }
                }
                Card::Private => session.mark_private_pending(),
                Card::CloneSeqno(n) => clone_seqno_val = n,
                Card::Timestamp(ts) => server_ts = Some(ts),
                Card::Need { hash } | Card::Gimme { hash } => {
                    match recv::handle_need_or_gimme(engines, session, &hash, Side::Client, true) {
                        Ok(cards) => pending_push.extend(cards),
                        Err(_) => { /* not authorized to push this cycle; ignored */ }
                    }
                }
                Card::Pragma { name, args } => apply_known_pragma(session, &name, &args),
                Card::Push { .. } | Card::Pull { .. } | Card::Clone { .. } | Card::Login { .. } => {
                    // Server never sends these to a client; tolerated as no-ops.
                }
                Card::Cookie(_) | Card::Comment(_) | Card::CFile { .. } | Card::Unknown { .. } => {}
            }
        }

        if let Some(ts) = &server_ts {
            if let Some(ts_token) = ts.split_whitespace().next() {
                if let Ok(server_time) = chrono::DateTime::parse_from_rfc3339(ts_token) {
                    let grace = (bytes_received as i64) / 5000 + 20;
                    let raw = chrono::Utc::now().signed_duration_since(server_time).num_seconds();
                    let adjusted_magnitude = (raw.abs() - grace).max(0);
                    if adjusted_magnitude > max_skew_secs.abs() {
                        max_skew_secs = if raw < 0 { -adjusted_magnitude } else { adjusted_magnitude };
                        skew_seen = true;
                    }
                }
            }
        }

        if fatal {
            break;
        }

        if let Some(c) = recv::handle_clone_seqno(clone_seqno_val) {
            pending_clone = Some(c);
        }

        let phantoms_after = engines.store.phantom_ids()?.len();
        let new_phantoms_discovered = phantoms_after > phantoms_before;
        let files_received_this_cycle = session.counters.files_received - files_received_before;
        let any_sent = session.counters.files_sent - files_sent_before > 0;
        let is_clone = config.mode == SyncMode::Clone;

        let go = (new_phantoms_discovered && phantoms_after > 0)
            || any_sent
            || (is_clone && cycle <= 2)
            || (is_clone && (files_received_this_cycle > 0 || clone_seqno_val > 0));

        gimme_cap = (2 * files_received_this_cycle as usize).max(200);

        if !go {
            break;
        }
    }

    let skew = if skew_seen && max_skew_secs.abs() > 10 { Some(SkewReport { seconds: max_skew_secs }) } else { None };

    Ok(SyncReport {
        cycles: cycle,
        files_received: session.counters.files_received,
        files_sent: session.counters.files_sent,
        errors: session.counters.errors,
        skew,
    })
}
