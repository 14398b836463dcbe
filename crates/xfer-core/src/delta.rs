// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Delta codec contract (§1, §6): out of scope as a real algorithm, but the
//! send/receive engines are written against this trait so a real codec can
//! be swapped in without touching protocol logic.

use crate::error::DeltaError;

pub trait DeltaCodec: Send + Sync {
    fn apply(&self, basis: &[u8], patch: &[u8]) -> Result<Vec<u8>, DeltaError>;
    fn encode(&self, basis: &[u8], target: &[u8]) -> Result<Vec<u8>, DeltaError>;
}

/// A stand-in codec for tests and demos: "patches" are the literal target
/// bytes (no compression against the basis). This satisfies the `apply`
/// half of the contract exactly; `encode` never produces anything shorter
/// than `target`, so the send engine's tie-break (§4.D) always falls back
/// to raw transmission when this codec is wired in — which is the
/// correct behavior for a codec that cannot actually delta-compress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDeltaCodec;

impl DeltaCodec for NullDeltaCodec {
    fn apply(&self, _basis: &[u8], patch: &[u8]) -> Result<Vec<u8>, DeltaError> {
        Ok(patch.to_vec())
    }

    fn encode(&self, _basis: &[u8], target: &[u8]) -> Result<Vec<u8>, DeltaError> {
        Ok(target.to_vec())
    }
}
