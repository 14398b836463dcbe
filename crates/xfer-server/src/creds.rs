// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Minimal [`Credentials`] implementations for the reference server binary.
//! A real deployment backs this with its own user database; these exist so
//! `xfer-server` runs standalone without one.

use std::collections::HashMap;

use xfer_core::auth::Credentials;
use xfer_core::session::CapabilitySet;

/// Accepts only the implicit `anonymous`/`nobody` grant; every named user
/// fails lookup. Sufficient for a read-only mirror.
#[derive(Debug, Default)]
pub struct AnonymousOnlyCredentials;

impl Credentials for AnonymousOnlyCredentials {
    fn lookup_secret(&self, _user: &str) -> Option<String> {
        None
    }

    fn capabilities_for(&self, _user: &str) -> CapabilitySet {
        CapabilitySet::default()
    }
}

/// A fixed in-memory user table: `username -> (secret, capability string)`,
/// loaded once at startup. Capability strings use the same `r`/`w`/`c`
/// letters as the wire's `login` grant.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    users: HashMap<String, (String, String)>,
}

impl StaticCredentials {
    pub fn new(users: HashMap<String, (String, String)>) -> Self {
        StaticCredentials { users }
    }
}

impl Credentials for StaticCredentials {
    fn lookup_secret(&self, user: &str) -> Option<String> {
        self.users.get(user).map(|(secret, _)| secret.clone())
    }

    fn capabilities_for(&self, user: &str) -> CapabilitySet {
        self.users.get(user).map(|(_, caps)| CapabilitySet::from_str(caps)).unwrap_or_default()
    }
}
