// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end exercises of a full sync cycle: a client driver talking to a
//! server handler over an in-process loopback transport (no sockets), so
//! these run as ordinary `cargo test` without binding a port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use xfer_client::{run_sync, ClientConfig, SyncMode, Transport, TransportError};
use xfer_core::auth::Credentials;
use xfer_core::crosslink::NoopCrosslink;
use xfer_core::delta::NullDeltaCodec;
use xfer_core::hash::{DualHasher, HashProvider};
use xfer_core::session::{CapabilitySet, Session, SessionPolicy};
use xfer_core::store::{InMemoryStore, Store};
use xfer_core::Engines;
use xfer_server::{handle_request, HandlerConfig};
use xfer_wire::Algorithm;

struct LoopbackTransport {
    store: Arc<Mutex<InMemoryStore>>,
    creds: TestCreds,
    config: HandlerConfig,
}

struct TestCreds {
    users: HashMap<String, (String, String)>,
}

impl Credentials for TestCreds {
    fn lookup_secret(&self, user: &str) -> Option<String> {
        self.users.get(user).map(|(secret, _)| secret.clone())
    }

    fn capabilities_for(&self, user: &str) -> CapabilitySet {
        self.users.get(user).map(|(_, caps)| CapabilitySet::from_str(caps)).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn exchange(&self, out: Vec<u8>, _max_redirects: u32, _compress: bool) -> Result<Vec<u8>, TransportError> {
        let hasher = DualHasher;
        let delta = NullDeltaCodec;
        let mut crosslink = NoopCrosslink;
        let mut store = self.store.lock().await;
        let mut engines =
            Engines { store: &mut *store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
        let mut session = Session::new(SessionPolicy::server_default());
        handle_request(&out, &mut engines, &mut session, &self.creds, &self.config)
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

fn seeded_server(server_code: &str, project_code: &str) -> (Arc<Mutex<InMemoryStore>>, HandlerConfig) {
    let mut store = InMemoryStore::new();
    let hasher = DualHasher;
    for content in [b"alpha".as_slice(), b"bravo".as_slice(), b"charlie".as_slice()] {
        let name = hasher.hash_one_shot(Algorithm::Sha1, content);
        store.seed(name, content.to_vec(), false, true);
    }
    let config = HandlerConfig {
        server_code: server_code.to_string(),
        project_code: project_code.to_string(),
    };
    (Arc::new(Mutex::new(store)), config)
}

fn anonymous_creds() -> TestCreds {
    TestCreds { users: HashMap::new() }
}

fn client_config(mode: SyncMode, project_code: &str) -> ClientConfig {
    ClientConfig {
        server_code: "srv1".to_string(),
        project_code: project_code.to_string(),
        mode,
        user: None,
        secret: None,
        cookie: None,
        client_version: 3,
        compress: false,
    }
}

#[tokio::test]
async fn clone_pulls_every_root_artifact_from_an_empty_client() {
    let (store, config) = seeded_server("srv1", "proj1");
    let transport = LoopbackTransport { store, creds: anonymous_creds(), config };

    let mut client_store = InMemoryStore::new();
    let hasher = DualHasher;
    let delta = NullDeltaCodec;
    let mut crosslink = NoopCrosslink;
    let mut engines =
        Engines { store: &mut client_store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
    let mut session = Session::new(SessionPolicy::client_default());

    let report = run_sync(&transport, &mut engines, &mut session, &client_config(SyncMode::Clone, "proj1"))
        .await
        .unwrap();

    assert_eq!(report.errors, 0);
    assert_eq!(report.files_received, 3);
    assert_eq!(engines.store.enumerate_all().unwrap().len(), 3);
}

#[tokio::test]
async fn pull_is_idempotent_once_fully_synced() {
    let (store, config) = seeded_server("srv1", "proj1");
    let transport = LoopbackTransport { store, creds: anonymous_creds(), config };

    let mut client_store = InMemoryStore::new();
    let hasher = DualHasher;
    let delta = NullDeltaCodec;
    let mut crosslink = NoopCrosslink;
    let mut engines =
        Engines { store: &mut client_store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
    let mut session = Session::new(SessionPolicy::client_default());

    run_sync(&transport, &mut engines, &mut session, &client_config(SyncMode::Clone, "proj1")).await.unwrap();

    let mut session2 = Session::new(SessionPolicy::client_default());
    let report = run_sync(&transport, &mut engines, &mut session2, &client_config(SyncMode::Pull, "proj1"))
        .await
        .unwrap();

    assert_eq!(report.errors, 0);
    assert_eq!(report.files_received, 0);
    assert_eq!(engines.store.enumerate_all().unwrap().len(), 3);
}

#[tokio::test]
async fn wrong_project_code_is_reported_as_an_error() {
    let (store, config) = seeded_server("srv1", "proj1");
    let transport = LoopbackTransport { store, creds: anonymous_creds(), config };

    let mut client_store = InMemoryStore::new();
    let hasher = DualHasher;
    let delta = NullDeltaCodec;
    let mut crosslink = NoopCrosslink;
    let mut engines =
        Engines { store: &mut client_store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
    let mut session = Session::new(SessionPolicy::client_default());

    let report = run_sync(&transport, &mut engines, &mut session, &client_config(SyncMode::Pull, "wrong-project"))
        .await
        .unwrap();

    assert!(report.errors > 0);
    assert_eq!(report.files_received, 0);
}

#[tokio::test]
async fn push_delivers_a_new_artifact_the_server_did_not_have() {
    let (store, config) = seeded_server("srv1", "proj1");
    let server_store_for_assertions = store.clone();
    let creds = TestCreds { users: [("writer".to_string(), ("s3cr3t".to_string(), "rw".to_string()))].into() };
    let transport = LoopbackTransport { store, creds, config };

    let mut client_store = InMemoryStore::new();
    let hasher = DualHasher;
    let payload = b"delta-shine";
    let name = hasher.hash_one_shot(Algorithm::Sha1, payload);
    client_store.seed(name.clone(), payload.to_vec(), false, true);

    let delta = NullDeltaCodec;
    let mut crosslink = NoopCrosslink;
    let mut engines =
        Engines { store: &mut client_store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
    let mut session = Session::new(SessionPolicy::client_default());

    let mut cfg = client_config(SyncMode::Push, "proj1");
    cfg.user = Some("writer".to_string());
    cfg.secret = Some("s3cr3t".to_string());

    let report = run_sync(&transport, &mut engines, &mut session, &cfg).await.unwrap();
    assert_eq!(report.errors, 0);

    let mut server_store = server_store_for_assertions.lock().await;
    let id = server_store.resolve(&name, false).unwrap().expect("server must have learned the name");
    assert_eq!(server_store.state(id).unwrap(), xfer_core::store::ArtifactState::Present);
    assert_eq!(server_store.get(id).unwrap(), payload);
}

#[tokio::test]
async fn login_with_wrong_secret_is_a_fatal_error() {
    let (store, config) = seeded_server("srv1", "proj1");
    let creds = TestCreds { users: [("writer".to_string(), ("correct-secret".to_string(), "rw".to_string()))].into() };
    let transport = LoopbackTransport { store, creds, config };

    let mut client_store = InMemoryStore::new();
    let hasher = DualHasher;
    let delta = NullDeltaCodec;
    let mut crosslink = NoopCrosslink;
    let mut engines =
        Engines { store: &mut client_store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
    let mut session = Session::new(SessionPolicy::client_default());

    let mut cfg = client_config(SyncMode::Pull, "proj1");
    cfg.user = Some("writer".to_string());
    cfg.secret = Some("totally-wrong".to_string());

    let report = run_sync(&transport, &mut engines, &mut session, &cfg).await.unwrap();
    assert!(report.errors > 0, "wrong secret must surface as a session error");
}
