// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Transport boundary (§6): one HTTP exchange, zlib compression, manual
//! redirect handling up to a caller-supplied cap. The driver never touches
//! the network itself — it hands a finished request body to this trait,
//! grounded on `sven-node`'s pattern of keeping I/O behind a small async
//! trait the control loop drives rather than inlined into it.

use std::io::{Read, Write};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Request(String),
    #[error("too many redirects (cap {0})")]
    TooManyRedirects(u32),
    #[error("compression failed: {0}")]
    Compression(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `out` and return the reply body. `compress` selects
    /// `application/x-fossil` (zlib) vs. `application/x-fossil-uncompressed`.
    async fn exchange(&self, out: Vec<u8>, max_redirects: u32, compress: bool) -> Result<Vec<u8>, TransportError>;
}

/// `reqwest`-backed transport against a single sync endpoint URL.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client with no built-in redirect policy always builds");
        HttpTransport { client, url: url.into() }
    }
}

fn zlib_compress(bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(bytes).map_err(|e| TransportError::Compression(e.to_string()))?;
    enc.finish().map_err(|e| TransportError::Compression(e.to_string()))
}

fn zlib_decompress(bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut dec = flate2::read::ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    dec.read_to_end(&mut out).map_err(|e| TransportError::Compression(e.to_string()))?;
    Ok(out)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, out: Vec<u8>, max_redirects: u32, compress: bool) -> Result<Vec<u8>, TransportError> {
        let body = if compress { zlib_compress(&out)? } else { out };
        let content_type =
            if compress { "application/x-fossil" } else { "application/x-fossil-uncompressed" };

        let mut url = self.url.clone();
        let mut redirects = 0u32;
        loop {
            let resp = self
                .client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body.clone())
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            if resp.status().is_redirection() {
                redirects += 1;
                if redirects > max_redirects {
                    return Err(TransportError::TooManyRedirects(max_redirects));
                }
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|h| h.to_str().ok())
                    .ok_or_else(|| TransportError::Request("redirect with no Location header".to_string()))?
                    .to_string();
                url = location;
                continue;
            }

            let status = resp.status();
            let bytes = resp.bytes().await.map_err(|e| TransportError::Request(e.to_string()))?;
            if !status.is_success() {
                return Err(TransportError::Request(format!("server returned {status}")));
            }
            return if compress { zlib_decompress(&bytes) } else { Ok(bytes.to_vec()) };
        }
    }
}
