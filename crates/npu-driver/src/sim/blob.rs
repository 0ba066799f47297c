// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Blob format understood by [`super::SimDriver`].
//!
//! ```text
//! [magic "NPUSIM01"][descriptor length: u32 LE][descriptor JSON][payload]
//! ```
//!
//! The descriptor lists the graph's arguments in declaration order, the
//! operations it was compiled from, and the bias byte the simulated kernel
//! adds to every element it copies. The payload is opaque to the device.

use crate::{DriverError, DriverResult};
use npu_common::{ArgumentMetadata, Operation};

/// Leading bytes of every simulator blob.
pub const SIM_BLOB_MAGIC: &[u8; 8] = b"NPUSIM01";

/// What the simulated device knows about a compiled graph.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimGraphDesc {
    pub name: String,
    pub arguments: Vec<ArgumentMetadata>,
    pub operations: Vec<Operation>,
    pub bias: u8,
}

/// A decoded simulator blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimBlob {
    pub desc: SimGraphDesc,
    pub payload: Vec<u8>,
}

impl SimBlob {
    pub fn new(desc: SimGraphDesc, payload: Vec<u8>) -> Self {
        Self { desc, payload }
    }

    /// Returns `true` if `bytes` starts with the simulator magic.
    pub fn is_sim_blob(bytes: &[u8]) -> bool {
        bytes.starts_with(SIM_BLOB_MAGIC)
    }

    pub fn encode(&self) -> DriverResult<Vec<u8>> {
        let desc = serde_json::to_vec(&self.desc)
            .map_err(|e| DriverError::InvalidBlob(format!("descriptor: {e}")))?;
        let desc_len = u32::try_from(desc.len())
            .map_err(|_| DriverError::InvalidBlob("descriptor too large".into()))?;

        let mut out = Vec::with_capacity(SIM_BLOB_MAGIC.len() + 4 + desc.len() + self.payload.len());
        out.extend_from_slice(SIM_BLOB_MAGIC);
        out.extend_from_slice(&desc_len.to_le_bytes());
        out.extend_from_slice(&desc);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> DriverResult<Self> {
        if !Self::is_sim_blob(bytes) {
            return Err(DriverError::InvalidBlob("missing simulator magic".into()));
        }
        let rest = &bytes[SIM_BLOB_MAGIC.len()..];
        if rest.len() < 4 {
            return Err(DriverError::InvalidBlob("truncated descriptor length".into()));
        }
        let desc_len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let rest = &rest[4..];
        if rest.len() < desc_len {
            return Err(DriverError::InvalidBlob(format!(
                "descriptor needs {desc_len} bytes, {} available",
                rest.len()
            )));
        }
        let desc: SimGraphDesc = serde_json::from_slice(&rest[..desc_len])
            .map_err(|e| DriverError::InvalidBlob(format!("descriptor: {e}")))?;
        Ok(Self {
            desc,
            payload: rest[desc_len..].to_vec(),
        })
    }
}
