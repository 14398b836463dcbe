// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Auth/Integrity (§4.C): the `login` card's tail-hash check plus a
//! nonce+shared-secret signature check, with a legacy cleartext fallback.
//! All comparisons against attacker-controlled values use a constant-time
//! compare, grounded on `sven-node::crypto::token::StoredToken::verify`'s
//! use of `subtle::ConstantTimeEq`.

use subtle::ConstantTimeEq;

use xfer_wire::Algorithm;

use crate::error::AuthError;
use crate::hash::HashProvider;
use crate::session::CapabilitySet;

/// Looks up a user's stored credential and capability string. An external
/// collaborator (the real store is a user database); this trait is the
/// seam the session's login check is written against.
pub trait Credentials: Send + Sync {
    /// `None` for unknown users and for the reserved names the spec
    /// requires rejecting at lookup (`developer`, `reader` — `anonymous`
    /// and `nobody` are special-cased before this is ever called).
    fn lookup_secret(&self, user: &str) -> Option<String>;
    fn capabilities_for(&self, user: &str) -> CapabilitySet;
}

pub struct LoginResult {
    pub capabilities: CapabilitySet,
}

fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Derive the legacy fallback secret for a server still storing cleartext
/// passwords (`len(pw) != 40`): `pw' = hash(user ":" pw)`, SHA-1 flavored
/// since that's the algorithm this fallback path predates SHA-3 support.
fn legacy_derive(hasher: &dyn HashProvider, user: &str, pw: &str) -> String {
    hasher
        .hash_one_shot(Algorithm::Sha1, format!("{user}:{pw}").as_bytes())
        .as_str()
        .to_string()
}

/// Validate one `login USER NONCE SIG` card.
///
/// `tail_bytes` is every byte of the request strictly after this card's
/// line — position-sensitive per §5 (a `login` card's tail-hash is
/// position-sensitive, so the caller must slice the buffer itself rather
/// than re-serializing parsed cards).
pub fn process_login(
    user: &str,
    nonce: &str,
    sig: &str,
    tail_bytes: &[u8],
    creds: &dyn Credentials,
    hasher: &dyn HashProvider,
) -> Result<LoginResult, AuthError> {
    let algo = Algorithm::from_hex_len(nonce.len()).ok_or(AuthError::MalformedCredential)?;

    let expected_nonce = hasher.hash_one_shot(algo, tail_bytes);
    if !constant_time_eq_str(expected_nonce.as_str(), nonce) {
        return Err(AuthError::LoginFailed);
    }

    if user == "anonymous" || user == "nobody" {
        return Ok(LoginResult { capabilities: CapabilitySet::anonymous() });
    }
    if user == "developer" || user == "reader" {
        return Err(AuthError::LoginFailed);
    }

    let pw = creds.lookup_secret(user).ok_or(AuthError::LoginFailed)?;
    let compute_sig = |secret: &str| hasher.hash_one_shot(algo, format!("{nonce}{secret}").as_bytes());

    if constant_time_eq_str(compute_sig(&pw).as_str(), sig) {
        return Ok(LoginResult { capabilities: creds.capabilities_for(user) });
    }

    if pw.len() != 40 {
        let legacy_pw = legacy_derive(hasher, user, &pw);
        if constant_time_eq_str(compute_sig(&legacy_pw).as_str(), sig) {
            return Ok(LoginResult { capabilities: creds.capabilities_for(user) });
        }
    }

    Err(AuthError::LoginFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::DualHasher;
    use std::collections::HashMap;

    struct TestCreds(HashMap<String, (String, String)>);

    impl Credentials for TestCreds {
        fn lookup_secret(&self, user: &str) -> Option<String> {
            self.0.get(user).map(|(pw, _)| pw.clone())
        }
        fn capabilities_for(&self, user: &str) -> CapabilitySet {
            self.0
                .get(user)
                .map(|(_, caps)| CapabilitySet::from_str(caps))
                .unwrap_or_default()
        }
    }

    fn creds() -> TestCreds {
        let mut m = HashMap::new();
        m.insert("alice".to_string(), ("s3cret".to_string(), "rw".to_string()));
        TestCreds(m)
    }

    fn well_formed(user: &str, pw: &str) -> (String, String, String, Vec<u8>) {
        let hasher = DualHasher;
        let tail = b"have aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n".to_vec();
        let nonce = hasher.hash_one_shot(Algorithm::Sha1, &tail);
        let sig = hasher.hash_one_shot(Algorithm::Sha1, format!("{nonce}{pw}").as_bytes());
        (user.to_string(), nonce.as_str().to_string(), sig.as_str().to_string(), tail)
    }

    #[test]
    fn well_formed_login_succeeds() {
        let (user, nonce, sig, tail) = well_formed("alice", "s3cret");
        let result = process_login(&user, &nonce, &sig, &tail, &creds(), &DualHasher).unwrap();
        assert!(result.capabilities.read);
        assert!(result.capabilities.write);
    }

    #[test]
    fn tampered_sig_fails() {
        let (user, nonce, _sig, tail) = well_formed("alice", "s3cret");
        let bad_sig = "0".repeat(40);
        assert!(process_login(&user, &nonce, &bad_sig, &tail, &creds(), &DualHasher).is_err());
    }

    #[test]
    fn tampered_nonce_fails() {
        let (user, _nonce, sig, tail) = well_formed("alice", "s3cret");
        let bad_nonce = "1".repeat(40);
        assert!(process_login(&user, &bad_nonce, &sig, &tail, &creds(), &DualHasher).is_err());
    }

    #[test]
    fn tampered_body_fails() {
        let (user, nonce, sig, _tail) = well_formed("alice", "s3cret");
        let other_tail = b"have bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\n".to_vec();
        assert!(process_login(&user, &nonce, &sig, &other_tail, &creds(), &DualHasher).is_err());
    }

    #[test]
    fn unknown_user_fails() {
        let (user, nonce, sig, tail) = well_formed("mallory", "whatever");
        assert!(process_login(&user, &nonce, &sig, &tail, &creds(), &DualHasher).is_err());
    }

    #[test]
    fn reserved_pseudo_users_rejected() {
        for name in ["developer", "reader"] {
            let (user, nonce, sig, tail) = well_formed(name, "x");
            assert!(process_login(&user, &nonce, &sig, &tail, &creds(), &DualHasher).is_err());
        }
    }

    #[test]
    fn anonymous_login_accepted_without_signature_check() {
        let hasher = DualHasher;
        let tail = b"pragma client-version 2\n".to_vec();
        let nonce = hasher.hash_one_shot(Algorithm::Sha1, &tail);
        let result = process_login(
            "anonymous",
            nonce.as_str(),
            "garbage-sig-value-that-is-still-40-chars",
            &tail,
            &creds(),
            &hasher,
        )
        .unwrap();
        assert!(result.capabilities.read);
        assert!(!result.capabilities.write);
    }

    #[test]
    fn legacy_cleartext_fallback_succeeds() {
        let hasher = DualHasher;
        let mut m = HashMap::new();
        // Cleartext password (len != 40), requires the legacy derivation path.
        m.insert("bob".to_string(), ("hunter2".to_string(), "r".to_string()));
        let creds = TestCreds(m);

        let tail = b"have cccccccccccccccccccccccccccccccccccccccc\n".to_vec();
        let nonce = hasher.hash_one_shot(Algorithm::Sha1, &tail);
        let legacy_pw = legacy_derive(&hasher, "bob", "hunter2");
        let sig = hasher.hash_one_shot(Algorithm::Sha1, format!("{nonce}{legacy_pw}").as_bytes());

        let result =
            process_login("bob", nonce.as_str(), sig.as_str(), &tail, &creds, &hasher).unwrap();
        assert!(result.capabilities.read);
    }
}
