// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-side session state (§3 "Session state"): ephemeral indices, counters,
//! policy, and negotiated peer capabilities. Lives only for the duration of
//! one sync, exactly like the borrowed-mutable `Session` value described in
//! §9 Design Notes (the original's global login/user/database handle
//! collapses into this one struct, handed in rather than reached for
//! through module-scope state).

use std::time::{Duration, Instant};

use crate::index::EphemeralIndex;

/// Read/write/clone authorization granted by a successful `login`, or by
/// the implicit anonymous grant.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    pub read: bool,
    pub write: bool,
    pub clone: bool,
}

impl CapabilitySet {
    pub fn anonymous() -> Self {
        CapabilitySet { read: true, write: false, clone: true }
    }

    /// Parse a capability string: `r` = read, `w` = write/push, `c` = clone.
    /// Unknown characters are ignored rather than rejected, matching the
    /// "unknown pragmas ignored" tolerance elsewhere in the grammar.
    pub fn from_str(caps: &str) -> Self {
        CapabilitySet {
            read: caps.contains('r'),
            write: caps.contains('w'),
            clone: caps.contains('c'),
        }
    }

    pub fn merge(&mut self, other: CapabilitySet) {
        self.read |= other.read;
        self.write |= other.write;
        self.clone |= other.clone;
    }
}

/// Negotiated capabilities of the remote peer, from `pragma client-version`
/// and related cards (§4.A, §4.D step 4).
#[derive(Debug, Default, Clone, Copy)]
pub struct PeerCapabilities {
    pub version: Option<u32>,
    pub supports_sha3: bool,
    /// Recent enough to be worth sending a privacy-aware `have` teaser for
    /// a private artifact the session isn't syncing (§4.D step 1).
    pub supports_private_teaser: bool,
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub sync_private: bool,
    pub mx_send: usize,
    pub max_time: Duration,
    /// 0 = off; otherwise the have-sweep cursor (§3, invariant 5: must be
    /// monotonically non-increasing until it reaches 0).
    pub resync: u64,
}

impl SessionPolicy {
    pub fn server_default() -> Self {
        SessionPolicy {
            sync_private: false,
            mx_send: 5 * 1024 * 1024,
            max_time: Duration::from_secs(30),
            resync: 0,
        }
    }

    pub fn client_default() -> Self {
        SessionPolicy {
            sync_private: false,
            mx_send: 250 * 1024,
            max_time: Duration::from_secs(30),
            resync: 0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub cards_sent: u64,
    pub cards_received: u64,
    pub files_sent: u64,
    pub files_received: u64,
    pub deltas_sent: u64,
    pub deltas_received: u64,
    pub igots_sent: u64,
    pub igots_received: u64,
    pub artifacts_this_cycle: u64,
    pub errors: u64,
}

/// The per-cycle, per-side session value threaded through the send/receive
/// engines. A new cycle re-creates the ephemeral index and resets the
/// per-cycle counters/deadline but keeps policy, capabilities, and the
/// cumulative error count.
pub struct Session {
    pub index: EphemeralIndex,
    pub policy: SessionPolicy,
    pub counters: Counters,
    pub auth: CapabilitySet,
    pub peer: PeerCapabilities,
    pub deadline: Instant,
    pub bytes_sent: usize,
    /// Resolves the "most-recent `private` modifier card, consumed on
    /// use" open question (§9): `true` right after a bare `private` card,
    /// cleared immediately after the next payload-bearing card consumes it.
    pending_private: bool,
    pub errors: Vec<String>,
}

impl Session {
    pub fn new(policy: SessionPolicy) -> Self {
        Session {
            index: EphemeralIndex::new(),
            deadline: Instant::now() + policy.max_time,
            policy,
            counters: Counters::default(),
            auth: CapabilitySet::default(),
            peer: PeerCapabilities::default(),
            bytes_sent: 0,
            pending_private: false,
            errors: Vec::new(),
        }
    }

    /// Start a new cycle: fresh ephemeral index, fresh byte/time budget,
    /// policy and cumulative auth/errors carried over.
    pub fn begin_cycle(&mut self) {
        self.index = EphemeralIndex::new();
        self.deadline = Instant::now() + self.policy.max_time;
        self.bytes_sent = 0;
        self.counters.artifacts_this_cycle = 0;
    }

    pub fn mark_private_pending(&mut self) {
        self.pending_private = true;
    }

    /// Consume the pending `private` flag for the card about to be
    /// processed; resets to `false` either way.
    pub fn take_pending_private(&mut self) -> bool {
        std::mem::take(&mut self.pending_private)
    }

    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn over_budget(&self) -> bool {
        self.bytes_sent >= self.policy.mx_send || self.deadline_passed()
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.counters.errors += 1;
    }
}

/// React to a `pragma NAME ARGS...` card, shared by the server handler and
/// the client driver. Unrecognized pragma names, and recognized ones with
/// no core-level effect, are acknowledged by doing nothing (§4.A).
pub fn apply_known_pragma(session: &mut Session, name: &str, args: &[String]) {
    match xfer_wire::KnownPragma::from_name(name) {
        Some(xfer_wire::KnownPragma::ClientVersion) => {
            if let Some(v) = args.first().and_then(|a| a.parse::<u32>().ok()) {
                session.peer.version = Some(v);
                session.peer.supports_sha3 = v >= 2;
                session.peer.supports_private_teaser = v >= 2;
            }
        }
        Some(xfer_wire::KnownPragma::UvSync) | Some(xfer_wire::KnownPragma::NoCompress) | None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_merge_is_union() {
        let mut a = CapabilitySet { read: true, write: false, clone: false };
        a.merge(CapabilitySet { read: false, write: true, clone: false });
        assert_eq!(a, CapabilitySet { read: true, write: true, clone: false });
    }

    #[test]
    fn pending_private_consumed_once() {
        let mut s = Session::new(SessionPolicy::server_default());
        s.mark_private_pending();
        assert!(s.take_pending_private());
        assert!(!s.take_pending_private());
    }

    #[test]
    fn anonymous_capabilities_grant_read_and_clone_only() {
        let caps = CapabilitySet::anonymous();
        assert!(caps.read);
        assert!(!caps.write);
        assert!(caps.clone);
    }
}
