// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP entry point: one POST route that accepts a raw or zlib-compressed
//! request body and returns a reply in the same encoding, exactly like
//! talking to a Fossil `/xfer` CGI endpoint (§6: `Content-Type:
//! application/x-fossil` selects zlib, `…-uncompressed` selects plain
//! text). Grounded on `sven-node`'s `AgentHandle` pattern (a small,
//! cheaply-cloneable handle wrapping `Arc<Mutex<...>>` state, passed to
//! axum via `State`).

use std::io::{Read, Write};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use tokio::sync::Mutex;

use xfer_core::auth::Credentials;
use xfer_core::crosslink::NoopCrosslink;
use xfer_core::delta::NullDeltaCodec;
use xfer_core::hash::DualHasher;
use xfer_core::session::{Session, SessionPolicy};
use xfer_core::store::InMemoryStore;
use xfer_core::Engines;

use crate::handler::{self, HandlerConfig};

const CONTENT_TYPE_COMPRESSED: &str = "application/x-fossil";
const CONTENT_TYPE_PLAIN: &str = "application/x-fossil-uncompressed";

fn zlib_decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut dec = flate2::read::ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)?;
    Ok(out)
}

fn zlib_compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(bytes)?;
    enc.finish()
}

/// Cheaply-cloneable handle passed to every axum handler via `State`.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<InMemoryStore>>,
    crosslink: Arc<Mutex<NoopCrosslink>>,
    creds: Arc<dyn Credentials>,
    config: Arc<HandlerConfig>,
    policy: SessionPolicy,
}

impl AppState {
    pub fn new(store: InMemoryStore, creds: Arc<dyn Credentials>, config: HandlerConfig) -> Self {
        AppState {
            store: Arc::new(Mutex::new(store)),
            crosslink: Arc::new(Mutex::new(NoopCrosslink)),
            creds,
            config: Arc::new(config),
            policy: SessionPolicy::server_default(),
        }
    }
}

async fn sync_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let compressed = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct != CONTENT_TYPE_PLAIN)
        .unwrap_or(true);

    let request = if compressed {
        match zlib_decompress(&body) {
            Ok(bytes) => bytes,
            Err(e) => return (StatusCode::BAD_REQUEST, format!("bad compressed body: {e}")).into_response(),
        }
    } else {
        body.to_vec()
    };

    let hasher = DualHasher;
    let delta = NullDeltaCodec;
    let mut store = state.store.lock().await;
    let mut crosslink = state.crosslink.lock().await;
    let mut engines = Engines { store: &mut *store, hasher: &hasher, delta: &delta, crosslink: &mut *crosslink };
    let mut session = Session::new(state.policy.clone());

    let reply = match handler::handle_request(&request, &mut engines, &mut session, state.creds.as_ref(), &state.config) {
        Ok(reply) => reply,
        Err(e) => return crate::error::ServerError::from(e).into_response(),
    };

    let (content_type, body) = if compressed {
        match zlib_compress(&reply) {
            Ok(bytes) => (CONTENT_TYPE_COMPRESSED, bytes),
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, format!("compression failed: {e}")).into_response(),
        }
    } else {
        (CONTENT_TYPE_PLAIN, reply)
    };

    (StatusCode::OK, [(axum::http::header::CONTENT_TYPE, HeaderValue::from_static(content_type))], body).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/xfer", post(sync_endpoint)).with_state(state)
}

pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "xfer server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
